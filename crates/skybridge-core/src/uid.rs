//! Alpaca UniqueID derivation from bus device names
//!
//! The device name bytes are folded into a 15-byte accumulator by cycling XOR, and
//! the accumulator nibbles are written into the `x` positions of a version-4 style
//! UUID template. The nibble for template position `i` is taken from accumulator
//! byte `(i / 2) % 15`, low half on even positions and high half on odd ones; the
//! dashes and the literal `4` and `8` consume positions without being replaced.
//!
//! This is a checksum, not a hash. Two names can map to the same identifier (any
//! two names whose folded accumulators agree, e.g. names differing by a swap of bytes
//! 15 positions apart). Clients only see the collision as two devices sharing a
//! UniqueID; the identifier is kept stable across releases rather than strengthened.

const TEMPLATE: &str = "xxxxxxxx-xxxx-4xxx-8xxx-xxxxxxxxxxxx";
const DIGEST_LEN: usize = 15;
const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Derive the Alpaca UniqueID for a bus device name
pub fn unique_id(device_name: &str) -> String {
    let mut digest = [0u8; DIGEST_LEN];
    for (i, byte) in device_name.bytes().enumerate() {
        digest[i % DIGEST_LEN] ^= byte;
    }

    TEMPLATE
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if c != 'x' {
                return c;
            }
            let byte = digest[(i / 2) % DIGEST_LEN];
            let nibble = if i % 2 == 0 { byte & 0x0f } else { byte >> 4 };
            HEX[nibble as usize] as char
        })
        .collect()
}

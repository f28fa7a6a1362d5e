//! UDP responder answering Alpaca discovery probes

use serde::Serialize;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Token a probe payload must contain
pub const DISCOVERY_TOKEN: &[u8] = b"alpacadiscovery1";

/// Well-known Alpaca discovery port
pub const DEFAULT_DISCOVERY_PORT: u16 = 32227;

/// Bounded wait for one datagram before looping again
const RECV_WAIT: Duration = Duration::from_secs(1);

/// Largest UDP payload over IPv4, so no datagram is cut short
const RECV_BUFFER: usize = 65_507;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to bind discovery socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Serialize)]
struct DiscoveryReply {
    #[serde(rename = "AlpacaPort")]
    alpaca_port: u16,
}

/// A discovery responder bound to one UDP port
pub struct DiscoveryResponder {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl DiscoveryResponder {
    /// Bind the discovery socket on all IPv4 interfaces with address reuse
    pub fn bind(port: u16) -> Result<Self, DiscoveryError> {
        let bind = |port: u16| -> io::Result<UdpSocket> {
            let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
            socket.set_reuse_address(true)?;
            socket.set_broadcast(true)?;
            socket.set_nonblocking(true)?;
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            socket.bind(&addr.into())?;
            UdpSocket::from_std(socket.into())
        };

        let socket = bind(port).map_err(|source| DiscoveryError::Bind { port, source })?;
        let local_addr = socket.local_addr()?;
        Ok(Self { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Answer probes until cancelled; the socket is closed when this returns
    pub async fn run(self, alpaca_port: u16, cancel: CancellationToken) {
        let reply = match serde_json::to_vec(&DiscoveryReply { alpaca_port }) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Failed to encode discovery reply");
                return;
            }
        };

        info!(port = self.local_addr.port(), alpaca_port, "Discovery server started");

        let mut buf = vec![0u8; RECV_BUFFER];
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = timeout(RECV_WAIT, self.socket.recv_from(&mut buf)) => received,
            };

            let (len, peer) = match received {
                // Nothing within the wait window
                Err(_) => continue,
                Ok(Err(e)) => {
                    debug!(error = %e, "Discovery receive failed");
                    continue;
                }
                Ok(Ok(datagram)) => datagram,
            };

            if !is_probe(&buf[..len]) {
                trace!(peer = %peer, len, "Ignoring non-discovery datagram");
                continue;
            }

            info!(peer = %peer, "Discovery request");
            if let Err(e) = self.socket.send_to(&reply, peer).await {
                warn!(peer = %peer, error = %e, "Failed to send discovery reply");
            }
        }

        info!(port = self.local_addr.port(), "Discovery server stopped");
    }
}

/// Substring match of the discovery token anywhere in the payload
pub fn is_probe(payload: &[u8]) -> bool {
    payload
        .windows(DISCOVERY_TOKEN.len())
        .any(|window| window == DISCOVERY_TOKEN)
}

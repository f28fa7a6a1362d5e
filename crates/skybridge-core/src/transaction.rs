//! Server transaction counter

use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide ServerTransactionID source
///
/// Each call to [`next`](Self::next) consumes one value; the counter wraps at `u32::MAX`.
#[derive(Debug, Default)]
pub struct TransactionCounter(AtomicU32);

impl TransactionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one value, returning the pre-increment count
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_strictly_increasing() {
        let counter = TransactionCounter::new();
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
    }

    #[test]
    fn test_wraps() {
        let counter = TransactionCounter(AtomicU32::new(u32::MAX));
        assert_eq!(counter.next(), u32::MAX);
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_concurrent_values_are_unique() {
        let counter = Arc::new(TransactionCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || (0..250).map(|_| counter.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 1000);
    }
}

//! Mesh traffic counters.
//!
//! Operators observe mesh health through these counters and the peer status
//! listing; a single lost or malformed datagram never surfaces as an error.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared atomic counters updated by the receive loop, timers, and senders.
#[derive(Debug, Default)]
pub(crate) struct MeshStatsInner {
    pub received: AtomicU64,
    pub sent: AtomicU64,
    pub dropped_decode: AtomicU64,
    pub dropped_admission: AtomicU64,
    pub dropped_backlog: AtomicU64,
    pub dropped_emit: AtomicU64,
    pub send_errors: AtomicU64,
    pub handler_errors: AtomicU64,
}

impl MeshStatsInner {
    pub fn snapshot(&self) -> MeshStatsSnapshot {
        MeshStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped_decode: self.dropped_decode.load(Ordering::Relaxed),
            dropped_admission: self.dropped_admission.load(Ordering::Relaxed),
            dropped_backlog: self.dropped_backlog.load(Ordering::Relaxed),
            dropped_emit: self.dropped_emit.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the mesh traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshStatsSnapshot {
    /// Signals decoded, admitted, and dispatched.
    pub received: u64,
    /// Datagrams transmitted.
    pub sent: u64,
    /// Datagrams no framing could decode.
    pub dropped_decode: u64,
    /// Well-formed signals rejected by the tumbler.
    pub dropped_admission: u64,
    /// Admitted signals discarded because the dispatch queue was full.
    pub dropped_backlog: u64,
    /// Outbound signals rejected by the emit whitelist.
    pub dropped_emit: u64,
    /// UDP transmit failures (counted, never raised).
    pub send_errors: u64,
    /// Handler invocations that errored or panicked.
    pub handler_errors: u64,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::MeshStatsInner;

    #[test]
    fn snapshot_copies_all_counters() {
        let inner = MeshStatsInner::default();
        inner.received.store(3, Ordering::Relaxed);
        inner.dropped_decode.store(2, Ordering::Relaxed);
        inner.send_errors.store(1, Ordering::Relaxed);

        let snapshot = inner.snapshot();
        assert_eq!(snapshot.received, 3);
        assert_eq!(snapshot.dropped_decode, 2);
        assert_eq!(snapshot.send_errors, 1);
        assert_eq!(snapshot.sent, 0);
    }
}

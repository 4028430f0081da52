//! Request activity counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters over the listener's activity.
///
/// A handle is available from `Client::stats` before the client starts and
/// stays valid for its whole lifetime; connection tasks update the counters
/// lock-free.
#[derive(Debug, Default)]
pub struct ProxyStats {
    active_connections: AtomicUsize,
    total_requests: AtomicU64,
}

impl ProxyStats {
    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Requests parsed since the listener started.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::SeqCst)
    }

    pub(crate) fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn request_received(&self) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
    }
}

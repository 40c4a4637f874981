//! Tunnel session identity and tracking.
//!
//! # Responsibilities
//! - Generate unique tunnel IDs for log correlation
//! - Count live tunnels so shutdown can wait for them to drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Only uniqueness is needed, so relaxed ordering is enough.
static TUNNEL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a CONNECT tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunnelId(u64);

impl TunnelId {
    pub fn new() -> Self {
        Self(TUNNEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TunnelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TunnelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tunnel-{}", self.0)
    }
}

/// Counts live tunnels.
#[derive(Debug, Clone, Default)]
pub struct TunnelTracker {
    active: Arc<AtomicU64>,
}

impl TunnelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tunnel. The returned guard unregisters it on drop.
    pub fn track(&self) -> TunnelGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        TunnelGuard {
            active: Arc::clone(&self.active),
            id: TunnelId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until no tunnel is live, giving up after `limit`.
    ///
    /// Returns the number of tunnels still open.
    pub async fn wait_idle(&self, limit: Duration) -> u64 {
        let deadline = tokio::time::Instant::now() + limit;
        while self.active_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.active_count()
    }
}

/// Keeps a tunnel registered for as long as it lives.
#[derive(Debug)]
pub struct TunnelGuard {
    active: Arc<AtomicU64>,
    id: TunnelId,
}

impl TunnelGuard {
    pub fn id(&self) -> TunnelId {
        self.id
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        tracing::debug!(tunnel_id = %self.id, active = remaining, "Tunnel released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_id_unique() {
        assert_ne!(TunnelId::new(), TunnelId::new());
    }

    #[test]
    fn tracker_counts() {
        let tracker = TunnelTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let a = tracker.track();
        let b = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(a.id(), b.id());

        drop(a);
        assert_eq!(tracker.active_count(), 1);
        drop(b);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_when_drained() {
        let tracker = TunnelTracker::new();
        let guard = tracker.track();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });
        assert_eq!(tracker.wait_idle(Duration::from_secs(5)).await, 0);
    }

    #[tokio::test]
    async fn wait_idle_gives_up() {
        let tracker = TunnelTracker::new();
        let _guard = tracker.track();
        assert_eq!(tracker.wait_idle(Duration::from_millis(150)).await, 1);
    }
}

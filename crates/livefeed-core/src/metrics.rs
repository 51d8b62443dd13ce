//! Per-subscription metrics.
//!
//! Each subscription owns its own counters; there is no shared registry.
//! [`SubscriptionMetrics`] is the point-in-time snapshot exposed through
//! the handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::state::ConnectionState;

/// Internal counters updated by the supervisor task.
#[derive(Debug, Default)]
pub(crate) struct FeedCounters {
    pub(crate) events_routed: AtomicU64,
    pub(crate) events_ignored: AtomicU64,
    pub(crate) handler_panics: AtomicU64,
    pub(crate) retries_scheduled: AtomicU64,
    pub(crate) connect_attempts: AtomicU64,
}

impl FeedCounters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Point-in-time metrics snapshot for one subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionMetrics {
    /// Current connection state.
    pub state: ConnectionState,
    /// Consecutive failures since the last `Established`.
    pub consecutive_failures: u32,
    /// Whether a reconnect is currently scheduled.
    pub retry_pending: bool,
    /// Total connect attempts, including the initial one.
    pub connect_attempts: u64,
    /// Total retries scheduled against the backoff budget.
    pub retries_scheduled: u64,
    /// Events that invoked a handler.
    pub events_routed: u64,
    /// Events dropped (unknown kind, no matching handler, undecodable row).
    pub events_ignored: u64,
    /// Handler invocations that panicked and were contained.
    pub handler_panics: u64,
    /// Time since the subscription was opened.
    pub age: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let c = FeedCounters::default();
        assert_eq!(FeedCounters::get(&c.events_routed), 0);
        assert_eq!(FeedCounters::get(&c.retries_scheduled), 0);
    }

    #[test]
    fn test_counter_increment() {
        let c = FeedCounters::default();
        FeedCounters::incr(&c.events_routed);
        FeedCounters::incr(&c.events_routed);
        assert_eq!(FeedCounters::get(&c.events_routed), 2);
    }
}

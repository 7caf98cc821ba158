//! # Cache configuration.
//!
//! Provides [`CacheConfig`] centralized settings for the lookup cache runtime.
//!
//! Config is consumed once, by [`CacheBuilder::build`](crate::CacheBuilder::build).
//!
//! ## Sentinel values
//! - `task_concurrency = 0` → unlimited (no registry-task semaphore created)
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Global configuration for one [`LookupCache`](crate::LookupCache).
///
/// Defines:
/// - **Registry subscriptions**: requested lease duration
/// - **Discard handling**: how long a discarded record waits before re-checking
/// - **Ordering**: bounded waits used by notification processing
/// - **Worker pools**: registry-task concurrency, bus and observer queue sizes
///
/// ## Notes
/// All fields are public. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Duration requested from a registry when subscribing for notifications.
    pub lease_duration: Duration,

    /// Delay before a discarded record is re-checked.
    ///
    /// Applies both to explicit discards and to records whose filter
    /// returned an indefinite outcome.
    pub discard_wait: Duration,

    /// Upper bound on how long a notification waits for its subscription
    /// to be published before it is dropped.
    pub publish_wait: Duration,

    /// Periodic wake interval while waiting on a subscription's ordering gate.
    ///
    /// Every wake re-checks whether the subscription was discarded.
    pub gate_poll: Duration,

    /// Maximum number of subscribe/drop tasks running at once.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` registry tasks run simultaneously
    pub task_concurrency: usize,

    /// Capacity of the diagnostic event bus ring buffer.
    pub bus_capacity: usize,

    /// Default per-observer delivery queue capacity.
    ///
    /// Observers may override it through [`Observe::queue_capacity`](crate::Observe::queue_capacity).
    pub observer_queue_capacity: usize,
}

impl CacheConfig {
    /// Returns the registry-task concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` concurrent registry tasks
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.task_concurrency == 0 {
            None
        } else {
            Some(self.task_concurrency)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the gate poll interval, never zero.
    #[inline]
    pub fn gate_poll_clamped(&self) -> Duration {
        self.gate_poll.max(Duration::from_millis(1))
    }
}

impl Default for CacheConfig {
    /// Default configuration:
    ///
    /// - `lease_duration = 5min`
    /// - `discard_wait = 10min`
    /// - `publish_wait = 10s`
    /// - `gate_poll = 100ms`
    /// - `task_concurrency = 8`
    /// - `bus_capacity = 1024`
    /// - `observer_queue_capacity = 1024`
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(5 * 60),
            discard_wait: Duration::from_secs(10 * 60),
            publish_wait: Duration::from_secs(10),
            gate_poll: Duration::from_millis(100),
            task_concurrency: 8,
            bus_capacity: 1024,
            observer_queue_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_concurrency_means_unlimited() {
        let cfg = CacheConfig {
            task_concurrency: 0,
            ..CacheConfig::default()
        };
        assert_eq!(cfg.concurrency_limit(), None);
        assert_eq!(CacheConfig::default().concurrency_limit(), Some(8));
    }

    #[test]
    fn test_clamped_accessors() {
        let cfg = CacheConfig {
            bus_capacity: 0,
            gate_poll: Duration::ZERO,
            ..CacheConfig::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.gate_poll_clamped(), Duration::from_millis(1));
    }
}

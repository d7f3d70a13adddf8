//! Fixed-window counter store.
//!
//! Windows are anchored to the first request seen for a key, not to wall
//! clock boundaries. Bursts of up to twice the limit are possible across a
//! window edge.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::rules::{RateLimitConfig, MAX_WINDOW_SECS};

/// Counter state for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    /// Requests admitted in the current window (always >= 1)
    pub count: u64,
    /// End of the current window
    pub reset_at: Instant,
}

impl CounterEntry {
    fn fresh(now: Instant, window: Duration) -> Self {
        let window = window.min(Duration::from_secs(MAX_WINDOW_SECS));
        Self {
            count: 1,
            reset_at: now.checked_add(window).unwrap_or(now),
        }
    }

    /// Whether the window has ended at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.reset_at <= now
    }
}

/// Outcome of a single counter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted,
    Rejected {
        /// Whole seconds until the window resets, rounded up
        retry_after_secs: u64,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }
}

/// Concurrent map from counter key to its fixed-window entry.
///
/// Each check runs under the owning shard's write lock, so the read, the
/// decision and the update are atomic for a given key.
#[derive(Debug, Default)]
pub struct WindowCounterStore {
    entries: DashMap<String, CounterEntry>,
}

impl WindowCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Count one request for `key` against `config`.
    ///
    /// The `(limit + 1)`-th request in a window is the first rejection; a
    /// rejected request does not touch the entry.
    pub fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: Instant,
    ) -> Decision {
        let window = config.window_duration();

        let mut inserted = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            inserted = true;
            CounterEntry::fresh(now, window)
        });
        if inserted {
            trace!(key = %key, limit = config.limit, "Started counter window");
            return Decision::Admitted;
        }

        let state = entry.value_mut();

        if state.is_expired(now) {
            *state = CounterEntry::fresh(now, window);
            trace!(key = %key, limit = config.limit, "Restarted expired counter window");
            return Decision::Admitted;
        }

        if state.count >= config.limit {
            let retry_after_secs = ceil_secs(state.reset_at.saturating_duration_since(now));
            debug!(
                key = %key,
                count = state.count,
                limit = config.limit,
                retry_after_secs,
                "Counter over limit"
            );
            return Decision::Rejected { retry_after_secs };
        }

        state.count += 1;
        trace!(key = %key, count = state.count, limit = config.limit, "Counted request");
        Decision::Admitted
    }

    /// Remove every entry whose window ended at or before `now`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_key, entry| {
            let expired = entry.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        });

        debug!(
            removed,
            remaining = self.entries.len(),
            "Counter sweep complete"
        );
        removed
    }

    /// Snapshot of the entry for `key`.
    pub fn get(&self, key: &str) -> Option<CounterEntry> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Number of tracked keys, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    if duration.subsec_nanos() > 0 {
        duration.as_secs() + 1
    } else {
        duration.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_first_request_starts_window() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(5, 60);
        let t0 = Instant::now();

        assert_eq!(store.check_and_increment("k", &config, t0), Decision::Admitted);

        let entry = store.get("k").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.reset_at, t0 + secs(60));
    }

    #[test]
    fn test_sixth_request_rejected_with_retry_after() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(5, 60);
        let t0 = Instant::now();

        for i in 0..5 {
            let decision = store.check_and_increment("k", &config, t0 + secs(i));
            assert_eq!(decision, Decision::Admitted, "request {} should be admitted", i + 1);
        }

        let decision = store.check_and_increment("k", &config, t0 + secs(5));
        assert_eq!(decision, Decision::Rejected { retry_after_secs: 55 });
    }

    #[test]
    fn test_rejection_does_not_mutate_entry() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(2, 60);
        let t0 = Instant::now();

        store.check_and_increment("k", &config, t0);
        store.check_and_increment("k", &config, t0);
        let before = store.get("k").unwrap();

        for _ in 0..3 {
            assert!(!store.check_and_increment("k", &config, t0 + secs(1)).is_admitted());
        }
        assert_eq!(store.get("k").unwrap(), before);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(1, 10);
        let t0 = Instant::now();

        store.check_and_increment("k", &config, t0);
        let decision = store.check_and_increment("k", &config, t0 + Duration::from_millis(9_100));
        assert_eq!(decision, Decision::Rejected { retry_after_secs: 1 });
    }

    #[test]
    fn test_window_reset_at_boundary() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(1, 60);
        let t0 = Instant::now();

        assert!(store.check_and_increment("k", &config, t0).is_admitted());
        assert!(!store.check_and_increment("k", &config, t0 + secs(59)).is_admitted());

        // reset_at == now counts as expired
        assert!(store.check_and_increment("k", &config, t0 + secs(60)).is_admitted());
        let entry = store.get("k").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.reset_at, t0 + secs(120));
    }

    #[test]
    fn test_keys_are_independent() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(1, 60);
        let t0 = Instant::now();

        assert!(store.check_and_increment("a", &config, t0).is_admitted());
        assert!(store.check_and_increment("b", &config, t0).is_admitted());
        assert!(!store.check_and_increment("a", &config, t0).is_admitted());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_edge_burst_is_allowed() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(3, 60);
        let t0 = Instant::now();

        store.check_and_increment("k", &config, t0);
        for _ in 0..2 {
            assert!(store.check_and_increment("k", &config, t0 + secs(59)).is_admitted());
        }
        for _ in 0..3 {
            assert!(store.check_and_increment("k", &config, t0 + secs(60)).is_admitted());
        }
        assert!(!store.check_and_increment("k", &config, t0 + secs(61)).is_admitted());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = WindowCounterStore::new();
        let short = RateLimitConfig::new(10, 10);
        let long = RateLimitConfig::new(10, 120);
        let t0 = Instant::now();

        store.check_and_increment("short", &short, t0);
        store.check_and_increment("long", &long, t0);

        assert_eq!(store.sweep(t0 + secs(5)), 0);
        assert_eq!(store.sweep(t0 + secs(10)), 1);
        assert!(store.get("short").is_none());
        assert!(store.get("long").is_some());
    }

    #[test]
    fn test_oversized_window_does_not_panic() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(1, u64::MAX);
        let t0 = Instant::now();

        assert!(store.check_and_increment("k", &config, t0).is_admitted());
        let entry = store.get("k").unwrap();
        assert!(entry.reset_at > t0);
        assert!(!store.check_and_increment("k", &config, t0 + secs(1)).is_admitted());
    }

    #[test]
    fn test_sweep_counts_each_removal() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(10, 5);
        let t0 = Instant::now();

        for key in ["a", "b", "c"] {
            store.check_and_increment(key, &config, t0);
        }
        store.check_and_increment("d", &RateLimitConfig::new(10, 60), t0);

        assert_eq!(store.sweep(t0 + secs(5)), 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let store = WindowCounterStore::new();
        let config = RateLimitConfig::new(10, 1);
        let t0 = Instant::now();

        store.check_and_increment("k", &config, t0);
        assert_eq!(store.sweep(t0 + secs(2)), 1);
        assert_eq!(store.sweep(t0 + secs(2)), 0);
        assert_eq!(store.sweep(t0 + secs(3)), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let store = Arc::new(WindowCounterStore::new());
        let config = RateLimitConfig::new(100, 60);
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let config = config.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| store.check_and_increment("shared", &config, now).is_admitted())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
        assert_eq!(store.get("shared").unwrap().count, 100);
    }
}

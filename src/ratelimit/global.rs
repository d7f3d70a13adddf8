//! Global per-address rate limiter.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::cleanup::{CleanupScheduler, DEFAULT_CLEANUP_INTERVAL};
use super::counter::{Decision, WindowCounterStore};
use super::descriptor::{global_counter_key, CallerContext};
use super::rejection::AdmissionDenied;
use super::rules::RateLimitConfig;
use crate::error;

/// Default requests per address per window.
pub const DEFAULT_GLOBAL_LIMIT: u64 = 1000;
/// Default global window in seconds.
pub const DEFAULT_GLOBAL_WINDOW: u64 = 60;

/// One ceiling per client address, regardless of operation.
///
/// Uses its own counter store, never shared with the per-operation tier.
pub struct GlobalRateLimiter {
    config: RateLimitConfig,
    store: Arc<WindowCounterStore>,
    cleanup_interval: Duration,
    cleanup: Mutex<Option<CleanupScheduler>>,
}

impl GlobalRateLimiter {
    /// Create a limiter allowing `limit` requests per `window_secs`.
    ///
    /// Fails when the limit or window is zero, or the window is too long.
    pub fn new(limit: u64, window_secs: u64) -> error::Result<Self> {
        Self::with_cleanup_interval(limit, window_secs, DEFAULT_CLEANUP_INTERVAL)
    }

    /// Create a limiter with a custom sweep period.
    pub fn with_cleanup_interval(
        limit: u64,
        window_secs: u64,
        cleanup_interval: Duration,
    ) -> error::Result<Self> {
        let config = RateLimitConfig::new(limit, window_secs);
        config.validate("global rate limit")?;
        Ok(Self::from_config(config, cleanup_interval))
    }

    fn from_config(config: RateLimitConfig, cleanup_interval: Duration) -> Self {
        Self {
            config,
            store: Arc::new(WindowCounterStore::new()),
            cleanup_interval,
            cleanup: Mutex::new(None),
        }
    }

    /// Admit or reject one request at the current time.
    pub fn check(&self, caller: Option<&CallerContext>) -> Result<(), AdmissionDenied> {
        self.check_at(caller, Instant::now())
    }

    /// Admit or reject one request at `now`. A missing caller is admitted.
    pub fn check_at(
        &self,
        caller: Option<&CallerContext>,
        now: Instant,
    ) -> Result<(), AdmissionDenied> {
        let Some(caller) = caller else {
            warn!("Admitting request without caller context");
            return Ok(());
        };

        let key = global_counter_key(&caller.address());
        trace!(key = %key, limit = self.config.limit, "Checking global rate limit");

        match self.store.check_and_increment(&key, &self.config, now) {
            Decision::Admitted => Ok(()),
            Decision::Rejected { retry_after_secs } => {
                debug!(address = %key, retry_after_secs, "Global rate limit exceeded");
                Err(AdmissionDenied::global())
            }
        }
    }

    /// Start the cleanup task. Does nothing if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut cleanup = self.cleanup.lock();
        if cleanup.is_none() {
            *cleanup = Some(CleanupScheduler::start(
                Arc::clone(&self.store),
                self.cleanup_interval,
                "global",
            ));
        }
    }

    /// Stop the cleanup task.
    pub fn stop(&self) {
        if let Some(scheduler) = self.cleanup.lock().take() {
            scheduler.stop();
        }
    }

    pub fn is_started(&self) -> bool {
        self.cleanup.lock().is_some()
    }

    /// Sweep expired counters now, outside the schedule.
    pub fn sweep(&self, now: Instant) -> usize {
        self.store.sweep(now)
    }

    pub fn limit(&self) -> u64 {
        self.config.limit
    }

    pub fn window_secs(&self) -> u64 {
        self.config.window
    }

    /// Get the number of tracked addresses.
    pub fn counter_count(&self) -> usize {
        self.store.len()
    }
}

impl Default for GlobalRateLimiter {
    fn default() -> Self {
        Self::from_config(
            RateLimitConfig::new(DEFAULT_GLOBAL_LIMIT, DEFAULT_GLOBAL_WINDOW),
            DEFAULT_CLEANUP_INTERVAL,
        )
    }
}

impl std::fmt::Debug for GlobalRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalRateLimiter")
            .field("config", &self.config)
            .field("counters", &self.store.len())
            .field("started", &self.is_started())
            .finish()
    }
}

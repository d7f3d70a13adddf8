//! Per-operation rate limiter.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::cleanup::{CleanupScheduler, DEFAULT_CLEANUP_INTERVAL};
use super::counter::{Decision, WindowCounterStore};
use super::descriptor::{operation_counter_key, CallerContext, OperationDescriptor};
use super::rejection::AdmissionDenied;
use super::resolver::ConfigResolver;

/// Limits each caller per operation, using limits chosen by a
/// [`ConfigResolver`].
///
/// Counters are keyed by client address, caller identity and operation key.
/// The limiter owns its counter store and the cleanup task that sweeps it.
pub struct OperationRateLimiter {
    resolver: ConfigResolver,
    store: Arc<WindowCounterStore>,
    cleanup_interval: Duration,
    cleanup: Mutex<Option<CleanupScheduler>>,
}

impl OperationRateLimiter {
    /// Create a limiter. Call [`start`](Self::start) to begin cleanup.
    pub fn new(resolver: ConfigResolver) -> Self {
        Self::with_cleanup_interval(resolver, DEFAULT_CLEANUP_INTERVAL)
    }

    /// Create a limiter with a custom sweep period.
    pub fn with_cleanup_interval(resolver: ConfigResolver, cleanup_interval: Duration) -> Self {
        Self {
            resolver,
            store: Arc::new(WindowCounterStore::new()),
            cleanup_interval,
            cleanup: Mutex::new(None),
        }
    }

    /// Admit or reject one operation at the current time.
    pub fn check(
        &self,
        operation: Option<&OperationDescriptor>,
        caller: Option<&CallerContext>,
    ) -> Result<(), AdmissionDenied> {
        self.check_at(operation, caller, Instant::now())
    }

    /// Admit or reject one operation at `now`.
    ///
    /// Missing or incomplete input is admitted: without an operation or a
    /// caller there is nothing to key a limit on.
    pub fn check_at(
        &self,
        operation: Option<&OperationDescriptor>,
        caller: Option<&CallerContext>,
        now: Instant,
    ) -> Result<(), AdmissionDenied> {
        let (Some(operation), Some(caller)) = (operation, caller) else {
            warn!(
                has_operation = operation.is_some(),
                has_caller = caller.is_some(),
                "Admitting request without operation metadata"
            );
            return Ok(());
        };
        let Some(operation_key) = operation.operation_key() else {
            warn!(
                operation_type = %operation.operation_type,
                operation_name = %operation.operation_name,
                "Admitting request with incomplete operation descriptor"
            );
            return Ok(());
        };

        let user_id = caller.authenticated_user();
        let (config, source) = self.resolver.resolve(&operation_key, user_id.is_some());
        let address = caller.address();
        let key = operation_counter_key(&address, user_id, &operation_key);

        trace!(
            key = %key,
            source = %source,
            limit = config.limit,
            window = config.window,
            "Checking operation rate limit"
        );

        match self.store.check_and_increment(&key, config, now) {
            Decision::Admitted => Ok(()),
            Decision::Rejected { retry_after_secs } => {
                debug!(
                    address = %address,
                    operation = %operation_key,
                    source = %source,
                    retry_after_secs,
                    "Operation rate limit exceeded"
                );
                Err(AdmissionDenied::operation(
                    config.message.as_deref(),
                    retry_after_secs,
                ))
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
                "operation",
            ));
        }
    }

    /// Stop the cleanup task. No further sweeps run after this returns.
    pub fn stop(&self) {
        if let Some(scheduler) = self.cleanup.lock().take() {
            scheduler.stop();
        }
    }

    /// Whether the cleanup task is active.
    pub fn is_started(&self) -> bool {
        self.cleanup.lock().is_some()
    }

    /// Sweep expired counters now, outside the schedule.
    pub fn sweep(&self, now: Instant) -> usize {
        self.store.sweep(now)
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Get the number of tracked counters.
    pub fn counter_count(&self) -> usize {
        self.store.len()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl std::fmt::Debug for OperationRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRateLimiter")
            .field("counters", &self.store.len())
            .field("cleanup_interval", &self.cleanup_interval)
            .field("started", &self.is_started())
            .finish()
    }
}

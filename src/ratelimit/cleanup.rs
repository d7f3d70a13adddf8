//! Background eviction of expired counters.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::counter::WindowCounterStore;

/// Default period between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic sweep task for one counter store.
///
/// Sweeps never change admission decisions, since an expired entry is
/// treated as absent anyway; they only bound memory. Stopping (or dropping)
/// the scheduler prevents further sweeps but lets a running one finish.
pub struct CleanupScheduler {
    tier: &'static str,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupScheduler {
    /// Spawn the sweep task on the current tokio runtime.
    ///
    /// The first sweep happens one `period` after start.
    pub fn start(store: Arc<WindowCounterStore>, period: Duration, tier: &'static str) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);

        info!(tier, period_secs = period.as_secs_f64(), "Starting counter cleanup");

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => {
                        debug!(tier, "Counter cleanup stopping");
                        break;
                    }
                    _ = tick.tick() => {
                        let removed = store.sweep(Instant::now());
                        if removed > 0 {
                            debug!(tier, removed, "Evicted expired counters");
                        }
                    }
                }
            }
        });

        Self {
            tier,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the task to stop without waiting for it.
    pub fn stop(&self) {
        // Err only means the task has already exited.
        let _ = self.shutdown.send(true);
    }

    /// Signal the task to stop and wait until it has exited.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!(tier = self.tier, "Counter cleanup stopped");
    }

    /// Whether the sweep task is still alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CleanupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupScheduler")
            .field("tier", &self.tier)
            .field("running", &self.is_running())
            .finish()
    }
}

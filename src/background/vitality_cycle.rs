//! Periodic component aging and auto-regeneration

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::vitality::ComponentHealthTracker;

/// Ages every tracked component on a fixed interval. Components that
/// fall into the critical band are regenerated in the same pass (when
/// the tracker's auto-regeneration is enabled).
pub struct VitalityCycle {
    tracker: Arc<ComponentHealthTracker>,
    interval: Duration,
}

impl VitalityCycle {
    pub fn new(tracker: Arc<ComponentHealthTracker>, interval: Duration) -> Self {
        Self { tracker, interval }
    }

    /// Run the aging loop until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "[VitalityCycle] Task starting"
        );
        let mut interval = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so a fresh process
        // doesn't age components at t=0.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[VitalityCycle] Received shutdown signal");
                    return;
                }
                _ = interval.tick() => {
                    let regenerated = self.tracker.run_aging_cycle();
                    if regenerated > 0 {
                        info!(regenerated, "[VitalityCycle] Components regenerated");
                    } else {
                        debug!("[VitalityCycle] Aging pass complete");
                    }
                }
            }
        }
    }
}

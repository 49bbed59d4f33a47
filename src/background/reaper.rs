//! T-cell expiry reaper
//!
//! Sleeps until the detector's soonest T-cell expiry rather than
//! polling on a fixed tick. T-cell ttl is constant, so cells spawned
//! while the reaper sleeps always expire after the current heap head —
//! sleeping until the head is safe. An idle fallback tick covers the
//! empty-heap case.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::immunity::AdaptiveThreatDetector;

/// Interval checked when no T-cells are scheduled.
const IDLE_TICK: Duration = Duration::from_secs(1);

/// Removes expired T-cells from the detector.
pub struct TCellReaper {
    detector: Arc<AdaptiveThreatDetector>,
}

impl TCellReaper {
    pub fn new(detector: Arc<AdaptiveThreatDetector>) -> Self {
        Self { detector }
    }

    /// Run the reap loop until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!("[TCellReaper] Task starting");

        loop {
            let wakeup = match self.detector.next_expiry() {
                Some(expiry) => tokio::time::Instant::from(expiry),
                None => tokio::time::Instant::now() + IDLE_TICK,
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[TCellReaper] Received shutdown signal");
                    return;
                }
                _ = tokio::time::sleep_until(wakeup) => {
                    let reaped = self.detector.reap_expired(Instant::now());
                    if reaped > 0 {
                        debug!(reaped, "[TCellReaper] Expired t-cells removed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImmunityConfig;
    use crate::immunity::ThreatKind;

    #[tokio::test]
    async fn reaper_retires_cells_after_ttl() {
        let cfg = ImmunityConfig {
            t_cell_ttl_ms: 20,
            ..ImmunityConfig::default()
        };
        let detector = Arc::new(AdaptiveThreatDetector::new(cfg));
        detector.detect("hot-signature", ThreatKind::Malware, 0.9);
        assert_eq!(detector.status().active_t_cells, 2);

        let cancel = CancellationToken::new();
        let reaper = TCellReaper::new(Arc::clone(&detector));
        let handle = tokio::spawn(reaper.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        handle.await.expect("task joins cleanly");

        assert_eq!(detector.status().active_t_cells, 0);
        assert_eq!(detector.next_expiry(), None, "heap drained");
    }
}

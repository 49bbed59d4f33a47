//! Periodic route fitness evolution

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::routing::RouteFitnessOptimizer;

/// Runs the optimizer's evolve step on a fixed interval.
pub struct RouteEvolver {
    routes: Arc<RouteFitnessOptimizer>,
    interval: Duration,
}

impl RouteEvolver {
    pub fn new(routes: Arc<RouteFitnessOptimizer>, interval: Duration) -> Self {
        Self { routes, interval }
    }

    /// Run the evolution loop until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "[RouteEvolver] Task starting"
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await; // discard the immediate first tick

        let mut generations = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(generations, "[RouteEvolver] Received shutdown signal");
                    return;
                }
                _ = interval.tick() => {
                    self.routes.evolve();
                    generations += 1;
                }
            }
        }
    }
}

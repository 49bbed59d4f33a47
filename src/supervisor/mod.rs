//! Runtime Supervisor — the single integration point
//!
//! Owns one instance of each runtime service, constructed from
//! `RuntimeConfig` at process start and handed to request handlers as
//! `Arc` clones. Contains no domain logic of its own: it wires
//! construction, background task spawning, and shutdown, nothing else.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::background::{RouteEvolver, TCellReaper, VitalityCycle};
use crate::config::RuntimeConfig;
use crate::immunity::AdaptiveThreatDetector;
use crate::limiter::RegenerativeLimiter;
use crate::routing::RouteFitnessOptimizer;
use crate::vitality::ComponentHealthTracker;

/// Names of supervised background tasks, for join/shutdown logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    HttpServer,
    VitalityCycle,
    TCellReaper,
    RouteEvolver,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::VitalityCycle => write!(f, "VitalityCycle"),
            TaskName::TCellReaper => write!(f, "TCellReaper"),
            TaskName::RouteEvolver => write!(f, "RouteEvolver"),
        }
    }
}

/// Owns the four runtime services and their background tasks.
pub struct RuntimeSupervisor {
    config: RuntimeConfig,
    limiter: Arc<RegenerativeLimiter>,
    vitality: Arc<ComponentHealthTracker>,
    immunity: Arc<AdaptiveThreatDetector>,
    routing: Arc<RouteFitnessOptimizer>,
}

impl RuntimeSupervisor {
    /// Construct every service from the validated config.
    pub fn new(config: RuntimeConfig) -> Self {
        let limiter = Arc::new(RegenerativeLimiter::new(config.limiter.clone()));
        let vitality = Arc::new(ComponentHealthTracker::new(config.vitality.clone()));
        let immunity = Arc::new(AdaptiveThreatDetector::new(config.immunity.clone()));
        let routing = Arc::new(RouteFitnessOptimizer::new(config.routing.clone()));
        info!("runtime supervisor initialized");
        Self {
            config,
            limiter,
            vitality,
            immunity,
            routing,
        }
    }

    pub fn limiter(&self) -> Arc<RegenerativeLimiter> {
        Arc::clone(&self.limiter)
    }

    pub fn vitality(&self) -> Arc<ComponentHealthTracker> {
        Arc::clone(&self.vitality)
    }

    pub fn immunity(&self) -> Arc<AdaptiveThreatDetector> {
        Arc::clone(&self.immunity)
    }

    pub fn routing(&self) -> Arc<RouteFitnessOptimizer> {
        Arc::clone(&self.routing)
    }

    /// Spawn the vitality cycle, T-cell reaper, and route evolver into
    /// the given task set. All three exit when `cancel` fires.
    pub fn spawn_background_tasks(
        &self,
        task_set: &mut JoinSet<Result<TaskName>>,
        cancel: CancellationToken,
    ) {
        let cycle = VitalityCycle::new(
            self.vitality(),
            Duration::from_millis(self.config.vitality.cycle_interval_ms),
        );
        let token = cancel.clone();
        task_set.spawn(async move {
            cycle.run(token).await;
            Ok(TaskName::VitalityCycle)
        });

        let reaper = TCellReaper::new(self.immunity());
        let token = cancel.clone();
        task_set.spawn(async move {
            reaper.run(token).await;
            Ok(TaskName::TCellReaper)
        });

        let evolver = RouteEvolver::new(
            self.routing(),
            Duration::from_millis(self.config.routing.evolve_interval_ms),
        );
        task_set.spawn(async move {
            evolver.run(cancel).await;
            Ok(TaskName::RouteEvolver)
        });
    }
}

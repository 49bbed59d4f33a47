//! Adaptive Resilience Runtime
//!
//! Process-local runtime services that request handlers consult for
//! admission control, component health, threat pattern memory, and
//! route performance ranking.
//!
//! ## Architecture
//!
//! - **Limiter**: per-client admission tokens, lazily regenerated
//! - **Vitality**: component health scores with self-regeneration
//! - **Immunity**: adaptive memory of repeated malicious signatures
//! - **Routing**: evolutionary fitness ranking of served routes
//!
//! A thin supervisor owns one instance of each and is the only
//! integration point; everything is in-memory and best-effort, with no
//! durability across restarts.

pub mod api;
pub mod background;
pub mod config;
pub mod immunity;
pub mod limiter;
pub mod routing;
pub mod supervisor;
pub mod vitality;

// Re-export the service types
pub use config::{ConfigError, RuntimeConfig};
pub use immunity::{AdaptiveThreatDetector, Antibody, DetectorStatus, Pathogen, TCell, ThreatKind};
pub use limiter::{LimiterStatus, RegenerativeLimiter};
pub use routing::{RouteFitnessOptimizer, RouteRecord};
pub use supervisor::{RuntimeSupervisor, TaskName};
pub use vitality::{ComponentHealth, ComponentHealthTracker, HealthState, RegenOutcome};

/// Generate a prefixed random identifier, e.g. `token_h3k9x2mda`.
pub(crate) fn short_id(prefix: &str) -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("{prefix}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_are_prefixed_and_distinct() {
        let a = short_id("token");
        let b = short_id("token");
        assert!(a.starts_with("token_"));
        assert_eq!(a.len(), "token_".len() + 9);
        assert_ne!(a, b);
    }
}

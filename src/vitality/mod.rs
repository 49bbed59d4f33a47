//! Component Vitality Tracker — health scores and self-regeneration
//!
//! Tracks a health score in `[0, 1]` and a generation counter per named
//! component. Errors damage health; regeneration resets it to full and
//! increments the generation. A periodic vitality cycle (see
//! `background::VitalityCycle`) ages every component and auto-regenerates
//! any that reach the critical band.
//!
//! Health bands:
//! - `Healthy`:  health > 0.5
//! - `Degraded`: 0.3 < health ≤ 0.5
//! - `Critical`: health ≤ 0.3

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::VitalityConfig;

/// Upper bound of the degraded band — above this a component is healthy.
pub const DEGRADED_CEILING: f64 = 0.5;

/// Upper bound of the critical band.
pub const CRITICAL_CEILING: f64 = 0.3;

/// Health band derived from a component's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Critical,
}

impl HealthState {
    /// Classify a health score.
    pub fn from_score(health: f64) -> Self {
        if health > DEGRADED_CEILING {
            HealthState::Healthy
        } else if health > CRITICAL_CEILING {
            HealthState::Degraded
        } else {
            HealthState::Critical
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "HEALTHY"),
            HealthState::Degraded => write!(f, "DEGRADED"),
            HealthState::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Snapshot of one component's vitality.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub component_id: String,
    pub health: f64,
    pub state: HealthState,
    pub generation: u64,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Mutation tags accumulated across regenerations
    pub mutations: Vec<String>,
}

/// Result of a regeneration attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RegenOutcome {
    /// Health reset to 1.0, generation incremented
    Regenerated { health: f64, generation: u64 },
    /// Component already at full health — no-op, generation untouched.
    /// This is the idempotency guard: a duplicate trigger lands here.
    AlreadyHealthy { health: f64, generation: u64 },
    /// Component was never registered
    Unknown,
}

struct ComponentRecord {
    health: f64,
    generation: u64,
    last_error_at: Option<DateTime<Utc>>,
    mutations: Vec<String>,
}

impl ComponentRecord {
    fn new() -> Self {
        Self {
            health: 1.0,
            generation: 0,
            last_error_at: None,
            mutations: Vec::new(),
        }
    }
}

/// Tracks health and generation for all registered components.
///
/// All mutation happens under one mutex, so overlapping regeneration
/// triggers for the same component serialize; the `AlreadyHealthy`
/// no-op then guarantees the generation counter moves at most once per
/// degradation episode.
pub struct ComponentHealthTracker {
    config: VitalityConfig,
    components: Mutex<HashMap<String, ComponentRecord>>,
}

impl ComponentHealthTracker {
    pub fn new(config: VitalityConfig) -> Self {
        Self {
            config,
            components: Mutex::new(HashMap::new()),
        }
    }

    /// Register a component at full health. Idempotent — re-registering
    /// an existing component leaves its state untouched.
    pub fn register(&self, component_id: &str) {
        let mut components = self.lock();
        components
            .entry(component_id.to_string())
            .or_insert_with(ComponentRecord::new);
    }

    /// Record an error against a component, damaging its health by the
    /// configured penalty. Unknown components are registered first, so
    /// error reporting never silently drops.
    pub fn report_error(&self, component_id: &str, context: &str) {
        let mut components = self.lock();
        let record = components
            .entry(component_id.to_string())
            .or_insert_with(ComponentRecord::new);
        record.health = (record.health - self.config.error_penalty).max(0.0);
        record.last_error_at = Some(Utc::now());

        let state = HealthState::from_score(record.health);
        if state != HealthState::Healthy {
            warn!(
                component = component_id,
                health = record.health,
                state = %state,
                context,
                "component health degraded"
            );
        }
    }

    /// Current health score, or `None` for unknown components.
    pub fn health(&self, component_id: &str) -> Option<f64> {
        self.lock().get(component_id).map(|r| r.health)
    }

    /// Current generation counter, or `None` for unknown components.
    pub fn generation(&self, component_id: &str) -> Option<u64> {
        self.lock().get(component_id).map(|r| r.generation)
    }

    /// Current health band, or `None` for unknown components.
    pub fn state(&self, component_id: &str) -> Option<HealthState> {
        self.health(component_id).map(HealthState::from_score)
    }

    /// Full snapshot of one component.
    pub fn snapshot(&self, component_id: &str) -> Option<ComponentHealth> {
        self.lock()
            .get(component_id)
            .map(|r| snapshot_of(component_id, r))
    }

    /// Snapshots of every registered component.
    pub fn all_components(&self) -> Vec<ComponentHealth> {
        self.lock()
            .iter()
            .map(|(id, r)| snapshot_of(id, r))
            .collect()
    }

    /// Attempt to regenerate a component: reset health to 1.0 and
    /// increment its generation.
    ///
    /// A component already at full health is left untouched
    /// (`AlreadyHealthy`), which makes concurrent or repeated triggers
    /// for the same degradation episode increment the generation exactly
    /// once.
    pub fn try_regenerate(&self, component_id: &str) -> RegenOutcome {
        let mut components = self.lock();
        let Some(record) = components.get_mut(component_id) else {
            return RegenOutcome::Unknown;
        };
        if record.health >= 1.0 {
            return RegenOutcome::AlreadyHealthy {
                health: record.health,
                generation: record.generation,
            };
        }
        regenerate_record(component_id, record);
        RegenOutcome::Regenerated {
            health: record.health,
            generation: record.generation,
        }
    }

    /// Run one aging pass: every component loses `aging_rate` health,
    /// and (when auto-regeneration is enabled) any component that falls
    /// into the critical band is regenerated immediately.
    ///
    /// Returns the number of components regenerated this pass.
    pub fn run_aging_cycle(&self) -> usize {
        let mut components = self.lock();
        let mut regenerated = 0;
        for (id, record) in components.iter_mut() {
            record.health = (record.health - self.config.aging_rate).max(0.0);
            if self.config.auto_regenerate && record.health <= CRITICAL_CEILING {
                regenerate_record(id, record);
                regenerated += 1;
            }
        }
        regenerated
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ComponentRecord>> {
        self.components.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reset a record to full health and advance its generation. Caller must
/// hold the tracker lock and have verified health < 1.0.
fn regenerate_record(component_id: &str, record: &mut ComponentRecord) {
    record.generation += 1;
    record.health = 1.0;

    // Occasional mutation tag, mirroring cellular drift across
    // generations.
    if rand::random::<f64>() < 0.3 {
        record.mutations.push(crate::short_id("mutation"));
    }

    info!(
        component = component_id,
        generation = record.generation,
        "component regenerated"
    );
}

fn snapshot_of(component_id: &str, record: &ComponentRecord) -> ComponentHealth {
    ComponentHealth {
        component_id: component_id.to_string(),
        health: record.health,
        state: HealthState::from_score(record.health),
        generation: record.generation,
        last_error_at: record.last_error_at,
        mutations: record.mutations.clone(),
    }
}

//! Adaptive Threat Detector — heuristic immune memory for repeated
//! malicious signatures
//!
//! Detection escalates through three tiers:
//! 1. **Memory bank** — signatures of confirmed threats block instantly.
//! 2. **Antibodies** — fuzzy-matched records of confirmed antigens block
//!    and strengthen with each success.
//! 3. **Pathogens** — unconfirmed signatures are counted; reaching the
//!    detection threshold promotes the signature to a permanent
//!    antibody.
//!
//! High-severity detections additionally spawn a pair of ephemeral
//! T-cells (helper + killer) that expire after a fixed ttl via a
//! min-heap delay queue drained by `background::TCellReaper`.
//!
//! All of this is best-effort, in-memory pattern matching — not a
//! security boundary.

pub mod matcher;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ImmunityConfig, MatcherKind};
pub use matcher::{EditDistanceMatcher, SignatureMatcher, SubstringMatcher};

/// Antibody starting strength at promotion.
const INITIAL_ANTIBODY_STRENGTH: f64 = 0.5;

/// Strength gained per successful antibody block (capped at 1.0).
const STRENGTH_PER_BLOCK: f64 = 0.1;

/// Classification of a reported threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatKind {
    Virus,
    Bacteria,
    Malware,
}

/// An as-yet-unconfirmed repeated threat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pathogen {
    pub id: String,
    pub signature: String,
    pub kind: ThreatKind,
    pub detection_count: u32,
    pub severity: f64,
}

/// Permanent adaptive memory of a confirmed antigen. Strength grows
/// monotonically with each successful block; antibodies are never
/// removed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Antibody {
    pub id: String,
    pub antigen: String,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
    pub successful_blocks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TCellKind {
    Helper,
    Killer,
}

/// Ephemeral response unit spawned for high-severity detections.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TCell {
    pub id: String,
    pub kind: TCellKind,
    pub target: String,
    pub activated_at: DateTime<Utc>,
    pub ttl_ms: u64,
    #[serde(skip)]
    expires_at: Instant,
}

/// Aggregate detector counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorStatus {
    /// Permanent antibodies held
    pub antibodies: usize,
    /// Live (unexpired) T-cells
    pub active_t_cells: usize,
    /// Confirmed signatures in the memory bank
    pub known_threats: usize,
    /// Unconfirmed pathogens still being counted
    pub active_threats: usize,
}

struct DetectorState {
    /// Unconfirmed threats, keyed by signature
    pathogens: HashMap<String, Pathogen>,
    /// Adaptive memory, in creation order (scan order for fuzzy matches)
    antibodies: Vec<Antibody>,
    /// Confirmed antigen signatures
    memory_bank: HashSet<String>,
    /// Live T-cells by internal id
    t_cells: HashMap<u64, TCell>,
    /// Expiry delay queue: earliest expiry at the top
    expiries: BinaryHeap<Reverse<(Instant, u64)>>,
    next_cell_id: u64,
}

/// Heuristic detector of repeated malicious signatures.
///
/// `detect` is a pure function of in-memory state: it never fails, and
/// a `false` return means "tracked but not blocked".
pub struct AdaptiveThreatDetector {
    config: ImmunityConfig,
    matcher: Box<dyn SignatureMatcher>,
    state: Mutex<DetectorState>,
}

impl AdaptiveThreatDetector {
    /// Build a detector with the matcher named in the config.
    pub fn new(config: ImmunityConfig) -> Self {
        let matcher: Box<dyn SignatureMatcher> = match config.matcher {
            MatcherKind::Substring => Box::new(SubstringMatcher),
            MatcherKind::EditDistance => {
                Box::new(EditDistanceMatcher::new(config.edit_distance_threshold))
            }
        };
        Self::with_matcher(config, matcher)
    }

    /// Build a detector with a caller-supplied matching strategy.
    pub fn with_matcher(config: ImmunityConfig, matcher: Box<dyn SignatureMatcher>) -> Self {
        info!(matcher = matcher.name(), "threat detector initialized");
        Self {
            config,
            matcher,
            state: Mutex::new(DetectorState {
                pathogens: HashMap::new(),
                antibodies: Vec::new(),
                memory_bank: HashSet::new(),
                t_cells: HashMap::new(),
                expiries: BinaryHeap::new(),
                next_cell_id: 0,
            }),
        }
    }

    /// Run a signature through the detection tiers.
    ///
    /// Returns `true` when the signature was blocked (memory bank or
    /// antibody match), `false` when it is merely being tracked.
    /// Regardless of the outcome, a severity above the configured
    /// threshold spawns a helper/killer T-cell pair.
    pub fn detect(&self, signature: &str, kind: ThreatKind, severity: f64) -> bool {
        let now = Instant::now();
        let mut state = self.lock();

        let blocked = if state.memory_bank.contains(signature) {
            // Confirmed threat: block instantly, no strength update.
            state.pathogens.remove(signature);
            info!(signature, "known threat blocked from memory bank");
            true
        } else if let Some(idx) = self.match_antibody(&state, signature) {
            let antibody = &mut state.antibodies[idx];
            antibody.successful_blocks += 1;
            antibody.strength = (antibody.strength + STRENGTH_PER_BLOCK).min(1.0);
            info!(
                signature,
                antibody = %antibody.id,
                antigen = %antibody.antigen,
                strength = antibody.strength,
                "antibody match — threat blocked"
            );
            state.pathogens.remove(signature);
            true
        } else {
            self.track_pathogen(&mut state, signature, kind, severity);
            false
        };

        if severity > self.config.t_cell_severity_threshold {
            self.spawn_t_cells(&mut state, signature, now);
        }

        blocked
    }

    /// Aggregate counters. Expired-but-unreaped T-cells are not counted.
    pub fn status(&self) -> DetectorStatus {
        let now = Instant::now();
        let state = self.lock();
        DetectorStatus {
            antibodies: state.antibodies.len(),
            active_t_cells: live_cells(&state, now),
            known_threats: state.memory_bank.len(),
            active_threats: state.pathogens.len(),
        }
    }

    /// All antibodies, in creation order.
    pub fn antibodies(&self) -> Vec<Antibody> {
        self.lock().antibodies.clone()
    }

    /// All live T-cells.
    pub fn active_t_cells(&self) -> Vec<TCell> {
        let now = Instant::now();
        self.lock()
            .t_cells
            .values()
            .filter(|c| c.expires_at > now)
            .cloned()
            .collect()
    }

    /// All unconfirmed pathogens.
    pub fn active_threats(&self) -> Vec<Pathogen> {
        self.lock().pathogens.values().cloned().collect()
    }

    /// Remove every T-cell whose ttl has elapsed as of `now`. Returns
    /// the number removed. Called by the reaper task; also usable
    /// directly for lazy cleanup.
    pub fn reap_expired(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let mut reaped = 0;
        while let Some(Reverse((expiry, id))) = state.expiries.peek().copied() {
            if expiry > now {
                break;
            }
            state.expiries.pop();
            if let Some(cell) = state.t_cells.remove(&id) {
                debug!(cell = %cell.id, signature = %cell.target, "t-cell expired");
                reaped += 1;
            }
        }
        reaped
    }

    /// Expiry instant of the soonest-dying T-cell, if any. The reaper
    /// sleeps until this instant instead of polling.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.lock().expiries.peek().map(|Reverse((t, _))| *t)
    }

    fn lock(&self) -> MutexGuard<'_, DetectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn match_antibody(&self, state: &DetectorState, signature: &str) -> Option<usize> {
        state
            .antibodies
            .iter()
            .position(|a| self.matcher.matches(signature, &a.antigen))
    }

    /// Count an unrecognized signature; promote to antibody at the
    /// threshold.
    fn track_pathogen(
        &self,
        state: &mut DetectorState,
        signature: &str,
        kind: ThreatKind,
        severity: f64,
    ) {
        let count = {
            let pathogen = state
                .pathogens
                .entry(signature.to_string())
                .or_insert_with(|| Pathogen {
                    id: crate::short_id("pathogen"),
                    signature: signature.to_string(),
                    kind,
                    detection_count: 0,
                    severity,
                });
            pathogen.detection_count += 1;
            pathogen.detection_count
        };
        debug!(signature, count, "pathogen detection recorded");

        if count >= self.config.antibody_threshold {
            state.pathogens.remove(signature);
            state.memory_bank.insert(signature.to_string());
            let antibody = Antibody {
                id: crate::short_id("antibody"),
                antigen: signature.to_string(),
                strength: INITIAL_ANTIBODY_STRENGTH,
                created_at: Utc::now(),
                successful_blocks: 0,
            };
            info!(
                antigen = signature,
                antibody = %antibody.id,
                "antibody created — signature promoted to adaptive memory"
            );
            state.antibodies.push(antibody);
        }
    }

    fn spawn_t_cells(&self, state: &mut DetectorState, target: &str, now: Instant) {
        let ttl = Duration::from_millis(self.config.t_cell_ttl_ms);
        for kind in [TCellKind::Helper, TCellKind::Killer] {
            let internal_id = state.next_cell_id;
            state.next_cell_id += 1;
            let cell = TCell {
                id: crate::short_id(match kind {
                    TCellKind::Helper => "tcell_helper",
                    TCellKind::Killer => "tcell_killer",
                }),
                kind,
                target: target.to_string(),
                activated_at: Utc::now(),
                ttl_ms: self.config.t_cell_ttl_ms,
                expires_at: now + ttl,
            };
            state.expiries.push(Reverse((cell.expires_at, internal_id)));
            state.t_cells.insert(internal_id, cell);
        }
        info!(signature = target, ttl_ms = self.config.t_cell_ttl_ms, "t-cell pair activated");
    }
}

fn live_cells(state: &DetectorState, now: Instant) -> usize {
    state.t_cells.values().filter(|c| c.expires_at > now).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AdaptiveThreatDetector {
        AdaptiveThreatDetector::new(ImmunityConfig::default())
    }

    #[test]
    fn antibody_promotion_at_threshold() {
        let d = detector();

        // Calls 1 and 2: tracked, not blocked.
        assert!(!d.detect("sigX", ThreatKind::Malware, 0.1));
        assert_eq!(d.active_threats()[0].detection_count, 1);
        assert!(!d.detect("sigX", ThreatKind::Malware, 0.1));
        assert_eq!(d.active_threats()[0].detection_count, 2);

        // Call 3: still not blocked, but promoted.
        assert!(!d.detect("sigX", ThreatKind::Malware, 0.1));
        let status = d.status();
        assert_eq!(status.antibodies, 1);
        assert_eq!(status.known_threats, 1);
        assert_eq!(status.active_threats, 0, "promotion clears the pathogen");
        assert_eq!(d.antibodies()[0].antigen, "sigX");
        assert!((d.antibodies()[0].strength - 0.5).abs() < 1e-9);
    }

    #[test]
    fn memory_recall_blocks_immediately() {
        let d = detector();
        for _ in 0..3 {
            d.detect("sigX", ThreatKind::Malware, 0.1);
        }
        // Fourth call: exact signature hits the memory bank — blocked,
        // no strength update.
        assert!(d.detect("sigX", ThreatKind::Malware, 0.1));
        assert_eq!(d.antibodies()[0].successful_blocks, 0);
    }

    #[test]
    fn antibody_fuzzy_block_strengthens() {
        let d = detector();
        for _ in 0..3 {
            d.detect("attack-vector", ThreatKind::Virus, 0.1);
        }
        // Variant containing the antigen: antibody path, not memory.
        assert!(d.detect("attack-vector-v2", ThreatKind::Virus, 0.1));
        let antibody = &d.antibodies()[0];
        assert_eq!(antibody.successful_blocks, 1);
        assert!((antibody.strength - 0.6).abs() < 1e-9);
    }

    #[test]
    fn antibody_strength_caps_at_one() {
        let d = detector();
        for _ in 0..3 {
            d.detect("worm", ThreatKind::Virus, 0.1);
        }
        for i in 0..10 {
            d.detect(&format!("worm-{i}"), ThreatKind::Virus, 0.1);
        }
        assert!((d.antibodies()[0].strength - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unconfirmed_detection_is_not_blocked() {
        let d = detector();
        assert!(!d.detect("one-off", ThreatKind::Bacteria, 0.2));
        assert_eq!(d.status().active_threats, 1);
        assert_eq!(d.status().known_threats, 0);
    }

    #[test]
    fn high_severity_spawns_exactly_two_t_cells() {
        let d = detector();
        assert_eq!(d.status().active_t_cells, 0);
        d.detect("burst", ThreatKind::Malware, 0.8);
        assert_eq!(d.status().active_t_cells, 2);

        let kinds: Vec<_> = d.active_t_cells().iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&TCellKind::Helper));
        assert!(kinds.contains(&TCellKind::Killer));
    }

    #[test]
    fn low_severity_spawns_no_t_cells() {
        let d = detector();
        d.detect("quiet", ThreatKind::Malware, 0.7); // threshold is strict
        assert_eq!(d.status().active_t_cells, 0);
    }

    #[test]
    fn t_cells_spawn_even_on_blocked_detections() {
        let d = detector();
        for _ in 0..3 {
            d.detect("loud", ThreatKind::Malware, 0.1);
        }
        // Blocked via memory bank, severity still escalates.
        assert!(d.detect("loud", ThreatKind::Malware, 0.9));
        assert_eq!(d.status().active_t_cells, 2);
    }

    #[test]
    fn reaper_removes_expired_cells() {
        let cfg = ImmunityConfig {
            t_cell_ttl_ms: 10,
            ..ImmunityConfig::default()
        };
        let d = AdaptiveThreatDetector::new(cfg);
        d.detect("burst", ThreatKind::Malware, 0.9);
        assert_eq!(d.status().active_t_cells, 2);

        let past_ttl = Instant::now() + Duration::from_millis(20);
        assert_eq!(d.reap_expired(past_ttl), 2);
        assert_eq!(d.status().active_t_cells, 0);
        assert_eq!(d.next_expiry(), None);
    }

    #[test]
    fn next_expiry_tracks_soonest_cell() {
        let d = detector();
        assert_eq!(d.next_expiry(), None);
        d.detect("burst", ThreatKind::Malware, 0.9);
        let expiry = d.next_expiry().expect("cells scheduled");
        assert!(expiry > Instant::now());
    }

    #[test]
    fn status_reads_are_idempotent() {
        let d = detector();
        d.detect("sigA", ThreatKind::Virus, 0.2);
        d.detect("sigB", ThreatKind::Malware, 0.2);
        assert_eq!(d.status(), d.status());
    }

    #[test]
    fn matcher_strategy_is_swappable() {
        // Edit-distance matcher: a one-character antigen no longer
        // matches arbitrary signatures.
        let cfg = ImmunityConfig {
            matcher: MatcherKind::EditDistance,
            ..ImmunityConfig::default()
        };
        let d = AdaptiveThreatDetector::new(cfg);
        for _ in 0..3 {
            d.detect("a", ThreatKind::Malware, 0.1);
        }
        assert_eq!(d.status().antibodies, 1);
        // Substring would block this; edit distance does not.
        assert!(!d.detect("completely-different-signature", ThreatKind::Malware, 0.1));
    }
}

//! Runtime Configuration
//!
//! Every tunable of the runtime lives here as an operator-editable TOML
//! value. Each struct implements `Default` with values matching the
//! original deployment's constants, so behavior is unchanged when no
//! config file is present.
//!
//! ## Loading Order
//!
//! 1. `ARR_CONFIG` environment variable (path to a TOML file)
//! 2. `arr.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded config is validated once at startup and then passed into
//! the supervisor's constructors — there is no global config state.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Default config filename searched in the working directory.
pub const CONFIG_FILENAME: &str = "arr.toml";

/// Environment variable naming an explicit config path.
pub const CONFIG_ENV_VAR: &str = "ARR_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiter tunables
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Component health tracking tunables
    #[serde(default)]
    pub vitality: VitalityConfig,

    /// Threat detector tunables
    #[serde(default)]
    pub immunity: ImmunityConfig,

    /// Route optimizer tunables
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl RuntimeConfig {
    /// Load configuration using the documented search order. Falls back
    /// to defaults when no file is found; a file that exists but fails
    /// to parse is an error.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!(path = %path, "loading config from {}", CONFIG_ENV_VAR);
            return Self::load_from_file(Path::new(&path));
        }
        let local = Path::new(CONFIG_FILENAME);
        if local.exists() {
            info!(path = CONFIG_FILENAME, "loading config from working directory");
            return Self::load_from_file(local);
        }
        info!("no config file found — using built-in defaults");
        Ok(Self::default())
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field invariants. Called once at startup; a bad config is
    /// a fatal error, not a recoverable condition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn fail(msg: &str) -> Result<(), ConfigError> {
            Err(ConfigError::Validation(msg.to_string()))
        }

        if self.limiter.max_tokens == 0 {
            return fail("limiter.max_tokens must be at least 1");
        }
        if self.limiter.token_lifespan_ms == 0 {
            return fail("limiter.token_lifespan_ms must be positive");
        }
        if self.limiter.regeneration_rate() < 0.0 {
            return fail("limiter production rate must not be negative");
        }
        if !(0.0..=1.0).contains(&self.vitality.error_penalty) {
            return fail("vitality.error_penalty must be within [0, 1]");
        }
        if !(0.0..1.0).contains(&self.vitality.aging_rate) {
            return fail("vitality.aging_rate must be within [0, 1)");
        }
        if self.vitality.cycle_interval_ms == 0 {
            return fail("vitality.cycle_interval_ms must be positive");
        }
        if self.immunity.antibody_threshold == 0 {
            return fail("immunity.antibody_threshold must be at least 1");
        }
        if self.immunity.t_cell_ttl_ms == 0 {
            return fail("immunity.t_cell_ttl_ms must be positive");
        }
        if !(0.0..=1.0).contains(&self.immunity.t_cell_severity_threshold) {
            return fail("immunity.t_cell_severity_threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.immunity.edit_distance_threshold) {
            return fail("immunity.edit_distance_threshold must be within [0, 1]");
        }
        if self.routing.evolve_interval_ms == 0 {
            return fail("routing.evolve_interval_ms must be positive");
        }
        if !(0.0..=1.0).contains(&self.routing.mutation_rate) {
            return fail("routing.mutation_rate must be within [0, 1]");
        }
        if self.routing.max_load_time_ms <= 0.0 {
            return fail("routing.max_load_time_ms must be positive");
        }
        if self.routing.access_saturation <= 0.0 {
            return fail("routing.access_saturation must be positive");
        }
        if !(0.0..=1.0).contains(&self.routing.load_weight) {
            return fail("routing.load_weight must be within [0, 1]");
        }
        Ok(())
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address for the HTTP server
    #[serde(default = "default_addr")]
    pub addr: String,
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: default_addr() }
    }
}

// ============================================================================
// Limiter
// ============================================================================

/// Rate limiter tunables. The production rate is the product of the
/// three light-reaction constants kept from the original deployment:
/// defaults yield 100 × 0.1 × 1.0 = 10 tokens/sec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    /// Photons per second
    #[serde(default = "default_photon_rate")]
    pub photon_rate: f64,
    /// ATP produced per photon
    #[serde(default = "default_atp_per_photon")]
    pub atp_per_photon: f64,
    /// Light intensity multiplier
    #[serde(default = "default_light_intensity")]
    pub light_intensity: f64,
    /// Token lifespan in milliseconds
    #[serde(default = "default_token_lifespan_ms")]
    pub token_lifespan_ms: u64,
    /// Bucket capacity per client
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_photon_rate() -> f64 {
    100.0
}
fn default_atp_per_photon() -> f64 {
    0.1
}
fn default_light_intensity() -> f64 {
    1.0
}
fn default_token_lifespan_ms() -> u64 {
    60_000
}
fn default_max_tokens() -> usize {
    10
}

impl LimiterConfig {
    /// Token production rate in tokens per second.
    pub fn regeneration_rate(&self) -> f64 {
        self.photon_rate * self.atp_per_photon * self.light_intensity
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            photon_rate: default_photon_rate(),
            atp_per_photon: default_atp_per_photon(),
            light_intensity: default_light_intensity(),
            token_lifespan_ms: default_token_lifespan_ms(),
            max_tokens: default_max_tokens(),
        }
    }
}

// ============================================================================
// Vitality
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VitalityConfig {
    /// Health lost per reported error
    #[serde(default = "default_error_penalty")]
    pub error_penalty: f64,
    /// Health lost per aging cycle tick
    #[serde(default = "default_aging_rate")]
    pub aging_rate: f64,
    /// Aging cycle interval in milliseconds
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
    /// Regenerate automatically when a component goes critical
    #[serde(default = "default_auto_regenerate")]
    pub auto_regenerate: bool,
}

fn default_error_penalty() -> f64 {
    0.2
}
fn default_aging_rate() -> f64 {
    0.02
}
fn default_cycle_interval_ms() -> u64 {
    5_000
}
fn default_auto_regenerate() -> bool {
    true
}

impl Default for VitalityConfig {
    fn default() -> Self {
        Self {
            error_penalty: default_error_penalty(),
            aging_rate: default_aging_rate(),
            cycle_interval_ms: default_cycle_interval_ms(),
            auto_regenerate: default_auto_regenerate(),
        }
    }
}

// ============================================================================
// Immunity
// ============================================================================

/// Antigen matching strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatcherKind {
    Substring,
    EditDistance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImmunityConfig {
    /// Detections of one signature before an antibody is created
    #[serde(default = "default_antibody_threshold")]
    pub antibody_threshold: u32,
    /// T-cell lifetime in milliseconds
    #[serde(default = "default_t_cell_ttl_ms")]
    pub t_cell_ttl_ms: u64,
    /// Severity above which a T-cell pair is spawned
    #[serde(default = "default_t_cell_severity_threshold")]
    pub t_cell_severity_threshold: f64,
    /// Antigen matching strategy
    #[serde(default = "default_matcher")]
    pub matcher: MatcherKind,
    /// Similarity threshold for the edit-distance matcher
    #[serde(default = "default_edit_distance_threshold")]
    pub edit_distance_threshold: f64,
}

fn default_antibody_threshold() -> u32 {
    3
}
fn default_t_cell_ttl_ms() -> u64 {
    60_000
}
fn default_t_cell_severity_threshold() -> f64 {
    0.7
}
fn default_matcher() -> MatcherKind {
    MatcherKind::Substring
}
fn default_edit_distance_threshold() -> f64 {
    0.8
}

impl Default for ImmunityConfig {
    fn default() -> Self {
        Self {
            antibody_threshold: default_antibody_threshold(),
            t_cell_ttl_ms: default_t_cell_ttl_ms(),
            t_cell_severity_threshold: default_t_cell_severity_threshold(),
            matcher: default_matcher(),
            edit_distance_threshold: default_edit_distance_threshold(),
        }
    }
}

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Evolve step interval in milliseconds
    #[serde(default = "default_evolve_interval_ms")]
    pub evolve_interval_ms: u64,
    /// Probability a route mutates per evolve step
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Load time at which the load score bottoms out, in milliseconds
    #[serde(default = "default_max_load_time_ms")]
    pub max_load_time_ms: f64,
    /// Access count at which the access score reaches 0.5
    #[serde(default = "default_access_saturation")]
    pub access_saturation: f64,
    /// Weight of the load score (access score gets the complement)
    #[serde(default = "default_load_weight")]
    pub load_weight: f64,
}

fn default_evolve_interval_ms() -> u64 {
    10_000
}
fn default_mutation_rate() -> f64 {
    0.1
}
fn default_max_load_time_ms() -> f64 {
    5_000.0
}
fn default_access_saturation() -> f64 {
    100.0
}
fn default_load_weight() -> f64 {
    0.7
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            evolve_interval_ms: default_evolve_interval_ms(),
            mutation_rate: default_mutation_rate(),
            max_load_time_ms: default_max_load_time_ms(),
            access_saturation: default_access_saturation(),
            load_weight: default_load_weight(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_original_constants() {
        let cfg = RuntimeConfig::default();
        assert!((cfg.limiter.regeneration_rate() - 10.0).abs() < 1e-9);
        assert_eq!(cfg.limiter.max_tokens, 10);
        assert_eq!(cfg.limiter.token_lifespan_ms, 60_000);
        assert_eq!(cfg.immunity.antibody_threshold, 3);
        assert_eq!(cfg.immunity.t_cell_ttl_ms, 60_000);
        assert_eq!(cfg.routing.evolve_interval_ms, 10_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[limiter]\nmax_tokens = 3\n\n[immunity]\nmatcher = \"edit-distance\""
        )
        .unwrap();

        let cfg = RuntimeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(cfg.limiter.max_tokens, 3);
        assert_eq!(cfg.immunity.matcher, MatcherKind::EditDistance);
        // Untouched sections keep defaults.
        assert_eq!(cfg.vitality.cycle_interval_ms, 5_000);
        assert_eq!(cfg.server.addr, "0.0.0.0:8080");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limiter]\nmax_tokenz = 3").unwrap();
        assert!(matches!(
            RuntimeConfig::load_from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut cfg = RuntimeConfig::default();
        cfg.limiter.max_tokens = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = RuntimeConfig::default();
        cfg.routing.mutation_rate = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = RuntimeConfig::default();
        cfg.immunity.t_cell_severity_threshold = -0.1;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = RuntimeConfig::load_from_file(Path::new("/nonexistent/arr.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

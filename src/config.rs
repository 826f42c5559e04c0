//! Configuration: per-symbol detector thresholds plus process-wide supervisor
//! settings, loaded from a YAML file with a `.env` overlay for credentials.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-symbol wall detection thresholds. Immutable once loaded; passed into a
/// `SymbolState` at creation and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    #[serde(default = "default_top_n_levels")]
    pub top_n_levels: usize,

    #[serde(default = "default_candidate_ratio_to_median", alias = "k_ratio")]
    pub candidate_ratio_to_median: Decimal,

    #[serde(default = "default_candidate_max_distance_ticks")]
    pub candidate_max_distance_ticks: u32,

    #[serde(default = "default_abs_qty_threshold", alias = "Amin")]
    pub abs_qty_threshold: i64,

    #[serde(default = "default_confirm_dwell_seconds", alias = "dwell_seconds")]
    pub confirm_dwell_seconds: f64,

    #[serde(default = "default_confirm_max_distance_ticks")]
    pub confirm_max_distance_ticks: u32,

    #[serde(default = "default_confirm_shrink_tolerance")]
    pub confirm_shrink_tolerance: Decimal,

    #[serde(default = "default_consume_window_seconds")]
    pub consume_window_seconds: f64,

    #[serde(default = "default_consume_drop_pct", alias = "cancel_share_max")]
    pub consume_drop_pct: Decimal,

    #[serde(default = "default_min_exec_confirm", alias = "Emin")]
    pub min_exec_confirm: i64,

    #[serde(default = "default_teleport_reset")]
    pub teleport_reset: bool,

    #[serde(default = "default_cooldowns")]
    pub cooldown_seconds: HashMap<String, f64>,
}

fn default_top_n_levels() -> usize {
    5
}
fn default_candidate_ratio_to_median() -> Decimal {
    Decimal::from(10)
}
fn default_candidate_max_distance_ticks() -> u32 {
    10
}
fn default_abs_qty_threshold() -> i64 {
    0
}
fn default_confirm_dwell_seconds() -> f64 {
    30.0
}
fn default_confirm_max_distance_ticks() -> u32 {
    1
}
fn default_confirm_shrink_tolerance() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
fn default_consume_window_seconds() -> f64 {
    8.0
}
fn default_consume_drop_pct() -> Decimal {
    Decimal::new(20, 2) // 0.20
}
fn default_min_exec_confirm() -> i64 {
    50
}
fn default_teleport_reset() -> bool {
    true
}
fn default_cooldowns() -> HashMap<String, f64> {
    let mut m = HashMap::new();
    m.insert("wall_candidate".to_string(), 60.0);
    m.insert("wall_lost".to_string(), 0.0);
    m.insert("wall_confirmed".to_string(), 120.0);
    m.insert("wall_consuming".to_string(), 45.0);
    m
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            top_n_levels: default_top_n_levels(),
            candidate_ratio_to_median: default_candidate_ratio_to_median(),
            candidate_max_distance_ticks: default_candidate_max_distance_ticks(),
            abs_qty_threshold: default_abs_qty_threshold(),
            confirm_dwell_seconds: default_confirm_dwell_seconds(),
            confirm_max_distance_ticks: default_confirm_max_distance_ticks(),
            confirm_shrink_tolerance: default_confirm_shrink_tolerance(),
            consume_window_seconds: default_consume_window_seconds(),
            consume_drop_pct: default_consume_drop_pct(),
            min_exec_confirm: default_min_exec_confirm(),
            teleport_reset: default_teleport_reset(),
            cooldown_seconds: default_cooldowns(),
        }
    }
}

impl DetectorConfig {
    /// Cooldown for one event kind, defaulting to zero if the key is absent.
    pub fn cooldown_for(&self, kind: &str) -> Duration {
        let secs = self.cooldown_seconds.get(kind).copied().unwrap_or(0.0);
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_n_levels == 0 {
            return Err(ConfigError::InvalidValue {
                field: "top_n_levels".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.candidate_ratio_to_median <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "candidate_ratio_to_median".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.confirm_dwell_seconds < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "confirm_dwell_seconds".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        if self.consume_window_seconds < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "consume_window_seconds".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        if self.consume_drop_pct <= Decimal::ZERO || self.consume_drop_pct > Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "consume_drop_pct".to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if self.confirm_shrink_tolerance < Decimal::ZERO || self.confirm_shrink_tolerance >= Decimal::ONE
        {
            return Err(ConfigError::InvalidValue {
                field: "confirm_shrink_tolerance".to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }
        Ok(())
    }
}

/// Process-wide settings governing the ingestion loop, independent of any
/// one symbol's thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupervisorConfig {
    pub symbols: Vec<String>,

    #[serde(default = "default_depth")]
    pub depth: u32,

    #[serde(default = "default_max_symbols")]
    pub max_symbols: usize,

    #[serde(default = "default_stream_idle_sleep_seconds")]
    pub stream_idle_sleep_seconds: f64,

    #[serde(default = "default_retry_backoff_initial_seconds")]
    pub retry_backoff_initial_seconds: f64,

    #[serde(default = "default_retry_backoff_max_seconds")]
    pub retry_backoff_max_seconds: f64,

    #[serde(default = "default_sink_queue_capacity")]
    pub sink_queue_capacity: usize,

    #[serde(default)]
    pub transport_endpoint: Option<String>,

    #[serde(default)]
    pub detector: DetectorConfig,
}

fn default_depth() -> u32 {
    20
}
fn default_max_symbols() -> usize {
    10
}
fn default_stream_idle_sleep_seconds() -> f64 {
    3600.0
}
fn default_retry_backoff_initial_seconds() -> f64 {
    1.0
}
fn default_retry_backoff_max_seconds() -> f64 {
    30.0
}
fn default_sink_queue_capacity() -> usize {
    256
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::MissingField("symbols".to_string()));
        }
        if self.symbols.len() > self.max_symbols {
            return Err(ConfigError::InvalidValue {
                field: "symbols".to_string(),
                reason: format!(
                    "{} symbols exceeds max_symbols={}",
                    self.symbols.len(),
                    self.max_symbols
                ),
            });
        }
        for symbol in &self.symbols {
            if symbol.trim().is_empty() {
                return Err(ConfigError::InvalidSymbol("empty symbol".to_string()));
            }
        }
        if self.depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "depth".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.retry_backoff_max_seconds < self.retry_backoff_initial_seconds {
            return Err(ConfigError::InvalidValue {
                field: "retry_backoff_max_seconds".to_string(),
                reason: "must be >= retry_backoff_initial_seconds".to_string(),
            });
        }
        if self.sink_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sink_queue_capacity".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        self.detector.validate()
    }

    /// Loads configuration from a YAML file at `path`. `.env` values are
    /// expected to have been loaded into the process environment separately
    /// via `dotenvy` before this is called; this function only parses the
    /// YAML surface.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Malformed(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

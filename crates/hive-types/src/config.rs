//! Explicit configuration struct threaded through constructors.
//!
//! Spec §9 design note: "Global settings singleton → explicit configuration
//! struct threaded through constructors." `HiveConfig` collects the
//! governance constants named in spec §6 plus the vault path and trust
//! level. Only `hive-cli` builds one from the process environment; every
//! library crate takes a `HiveConfig` (or individual fields) as a
//! constructor argument.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::TrustLevel;

/// Governance constants and environment influences (spec §6 "Environment
/// influences").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    /// Filesystem root under which the Akashic Record stores its streams.
    pub vault_path: PathBuf,
    /// Trust level binding approval requirements to action class.
    pub trust_level: TrustLevel,
    /// Maximum retry attempts for a FAILED task before it is left failed.
    pub max_retries: u32,
    /// Oscillation detector window parameter `N` (fires on `2*N` alternation).
    pub max_oscillations: usize,
    /// Sentinel runaway threshold: events per `rate_window_seconds`.
    pub max_event_rate: u32,
    /// Sentinel runaway window, in seconds.
    pub rate_window_seconds: u64,
    /// Sentinel loop-detection threshold: failures of the same task.
    pub max_loop_count: u32,
    /// Sentinel cost ceiling, in the same unit as `llm.response` cost fields.
    pub max_cost: f64,
    /// Sentinel KPI-drift relative-drop threshold.
    pub kpi_drop_threshold: f64,
    /// Bearer/header key expected at the boundary layer (out of scope for
    /// this core, but carried so `hive-cli` can demonstrate the check).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for HiveConfig {
    fn default() -> Self {
        HiveConfig {
            vault_path: PathBuf::from("./vault"),
            trust_level: TrustLevel::ProposeConfirm,
            max_retries: 3,
            max_oscillations: 3,
            max_event_rate: 100,
            rate_window_seconds: 60,
            max_loop_count: 5,
            max_cost: 10.0,
            kpi_drop_threshold: 0.2,
            api_key: None,
        }
    }
}

impl HiveConfig {
    /// Layers defaults, an optional TOML file at `path` (if it exists), and
    /// `HIVE_`-prefixed environment variables, in that order of increasing
    /// precedence — the same layering shape the orchestration-facing crates
    /// in this workspace use for their own settings.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&HiveConfig::default())?);
        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }
        builder = builder.add_source(config::Environment::with_prefix("HIVE").separator("__"));
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = HiveConfig::default();
        assert!(cfg.max_retries > 0);
        assert_eq!(cfg.trust_level, TrustLevel::ProposeConfirm);
    }
}

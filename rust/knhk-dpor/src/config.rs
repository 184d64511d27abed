//! Configuration loading (§2 ambient stack), grounded in
//! `knhk-config::config::load_config`'s `env > file > defaults` layering.

use crate::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the engine reacts to a `NextTrace` replay that does not fully fire
/// (§7, §9 Open Question resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergencePolicy {
    /// Log the divergence at `debug` and continue with divergent scheduling.
    LogOnly,
    /// Treat every id that never fired as absent from future candidate
    /// traces; used by the minimizer's clusterizer.
    TreatAsAbsent,
}

impl Default for DivergencePolicy {
    fn default() -> Self {
        DivergencePolicy::LogOnly
    }
}

/// Minimizer aggressiveness (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Aggressiveness {
    None,
    AllTimersFirstItr,
    StopImmediately,
}

impl Default for Aggressiveness {
    fn default() -> Self {
        Aggressiveness::AllTimersFirstItr
    }
}

/// Which `AmbiguityResolver` the minimizer's wildcard matcher uses (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityStrategyKind {
    SrcDstFifoOnly,
    BackTrack,
    FirstAndLastBacktrack,
    LastOnly,
}

impl Default for AmbiguityStrategyKind {
    fn default() -> Self {
        AmbiguityStrategyKind::BackTrack
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DporConfig {
    /// Maximum depth a run may reach before the driver stops enqueueing new
    /// messages (§4.1 "depth bound reached").
    pub depth_bound: Option<usize>,
    /// Overall wall-clock budget for a single `search()` call.
    pub dpor_budget_seconds: u64,
    pub minimizer_aggressiveness: Aggressiveness,
    pub ambiguity_strategy: AmbiguityStrategyKind,
    pub divergence_policy: DivergencePolicy,
}

impl Default for DporConfig {
    fn default() -> Self {
        Self {
            depth_bound: None,
            dpor_budget_seconds: 300,
            minimizer_aggressiveness: Aggressiveness::default(),
            ambiguity_strategy: AmbiguityStrategyKind::default(),
            divergence_policy: DivergencePolicy::default(),
        }
    }
}

/// Load configuration: env var overrides win over the TOML file, which
/// wins over built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<DporConfig> {
    let mut config = match path {
        Some(p) if p.exists() => load_from_file(p)?,
        _ => DporConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_from_file(path: &Path) -> Result<DporConfig> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

pub fn apply_env_overrides(config: &mut DporConfig) -> Result<()> {
    if let Ok(v) = std::env::var("KNHK_DPOR_DEPTH_BOUND") {
        config.depth_bound = Some(
            v.parse()
                .map_err(|_| EngineError::Configuration(format!("invalid KNHK_DPOR_DEPTH_BOUND: {v}")))?,
        );
    }
    if let Ok(v) = std::env::var("KNHK_DPOR_BUDGET_SECONDS") {
        config.dpor_budget_seconds = v
            .parse()
            .map_err(|_| EngineError::Configuration(format!("invalid KNHK_DPOR_BUDGET_SECONDS: {v}")))?;
    }
    if let Ok(v) = std::env::var("KNHK_DPOR_DIVERGENCE_POLICY") {
        config.divergence_policy = match v.as_str() {
            "log_only" => DivergencePolicy::LogOnly,
            "treat_as_absent" => DivergencePolicy::TreatAsAbsent,
            other => {
                return Err(EngineError::Configuration(format!(
                    "invalid KNHK_DPOR_DIVERGENCE_POLICY: {other}"
                )))
            }
        };
    }
    Ok(())
}

pub fn validate_config(config: &DporConfig) -> Result<()> {
    if config.dpor_budget_seconds == 0 {
        return Err(EngineError::Configuration(
            "dpor_budget_seconds must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// Default config file location, mirroring the teacher's `~/.knhk/config.toml`
/// convention but scoped to this tool.
pub fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| EngineError::Configuration("HOME not set".into()))?;
    let mut path = PathBuf::from(home);
    path.push(".knhk");
    path.push("dpor.toml");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DporConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let mut config = DporConfig::default();
        config.dpor_budget_seconds = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn env_override_wins_over_default() {
        std::env::set_var("KNHK_DPOR_DEPTH_BOUND", "42");
        let mut config = DporConfig::default();
        apply_env_overrides(&mut config).unwrap();
        std::env::remove_var("KNHK_DPOR_DEPTH_BOUND");
        assert_eq!(config.depth_bound, Some(42));
    }
}

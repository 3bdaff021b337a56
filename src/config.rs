use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AdaptiveError, Result};

/// Strategies the safe-mode paths know how to parameterise and allocate to.
pub const DEFAULT_SAFE_MODE_STRATEGIES: [&str; 4] =
    ["iron_condor", "wheel", "pmcc", "bull_put_spread"];

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub adaptive: AdaptiveManagerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Risk posture settings for the anomaly-gated position sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdaptiveManagerConfig {
    /// Multiplier applied to position sizes while an anomaly is active (e.g., 0.5 = halve)
    #[serde(default = "default_reduction_factor")]
    pub position_sizing_reduction_factor: f64,
    /// Minutes an anomaly stays active before decaying back to normal
    #[serde(default = "default_cooldown_minutes")]
    pub anomaly_cooldown_minutes: i64,
    /// Explainability log capacity (oldest entries dropped first)
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
}

fn default_reduction_factor() -> f64 {
    0.5
}

fn default_cooldown_minutes() -> i64 {
    30
}

fn default_max_log_entries() -> usize {
    1000
}

impl Default for AdaptiveManagerConfig {
    fn default() -> Self {
        Self {
            position_sizing_reduction_factor: default_reduction_factor(),
            anomaly_cooldown_minutes: default_cooldown_minutes(),
            max_log_entries: default_max_log_entries(),
        }
    }
}

impl AdaptiveManagerConfig {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let factor = self.position_sizing_reduction_factor;
        if !factor.is_finite() || factor <= 0.0 || factor > 1.0 {
            errors.push(format!(
                "position_sizing_reduction_factor must be within (0, 1], got {factor}"
            ));
        }
        if self.anomaly_cooldown_minutes < 0 {
            errors.push("anomaly_cooldown_minutes must be non-negative".to_string());
        }
        if self.max_log_entries == 0 {
            errors.push("max_log_entries must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Orchestrator settings: provenance, artifact output, safe-mode universe
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Deployment code version stamped on every artifact
    #[serde(default = "default_code_version")]
    pub code_version: String,
    /// Optional data snapshot identifier (timestamp or hash); creation time if unset
    #[serde(default)]
    pub data_snapshot: Option<String>,
    #[serde(default)]
    pub git_commit: Option<String>,
    /// Root directory for JSON decision artifacts
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Write one JSON artifact per optimization / allocation decision
    #[serde(default)]
    pub persist_artifacts: bool,
    #[serde(default = "default_portfolio_name")]
    pub portfolio_name: String,
    #[serde(default = "default_safe_mode_strategies")]
    pub safe_mode_strategies: Vec<String>,
}

fn default_code_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_portfolio_name() -> String {
    "adaptive_options".to_string()
}

fn default_safe_mode_strategies() -> Vec<String> {
    DEFAULT_SAFE_MODE_STRATEGIES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            code_version: default_code_version(),
            data_snapshot: None,
            git_commit: None,
            output_dir: None,
            persist_artifacts: false,
            portfolio_name: default_portfolio_name(),
            safe_mode_strategies: default_safe_mode_strategies(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.code_version.trim().is_empty() {
            errors.push("code_version must not be empty".to_string());
        }
        if self.safe_mode_strategies.is_empty() {
            errors.push("safe_mode_strategies must list at least one strategy".to_string());
        }
        if self.persist_artifacts && self.output_dir.is_none() {
            errors.push("persist_artifacts requires output_dir".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the rolling log file (console only when unset)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ADAPTIVE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // ADAPTIVE_ADAPTIVE__ANOMALY_COOLDOWN_MINUTES, ADAPTIVE_ORCHESTRATOR__CODE_VERSION, ...
            .add_source(
                Environment::with_prefix("ADAPTIVE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(mut e) = self.adaptive.validate() {
            errors.append(&mut e);
        }
        if let Err(mut e) = self.orchestrator.validate() {
            errors.append(&mut e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Collapse a list of validation messages into a single rejected-call error.
pub(crate) fn ensure_valid(result: std::result::Result<(), Vec<String>>) -> Result<()> {
    result.map_err(|errors| AdaptiveError::Validation(errors.join("; ")))
}

//! Versioned strategy-parameter results.
//!
//! Consumers gauge trust by branching on `optimization_method`: the two
//! safe-mode tags mark conservative, non-learned defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::market::{MarketRegime, MarketState};
use super::version::VersionStamp;
use crate::error::{AdaptiveError, Result};

pub const METHOD_BAYESIAN_GP: &str = "bayesian_gaussian_process";
pub const METHOD_RL_INTEGRATED: &str = "rl_integrated";
pub const METHOD_RULE_BASED: &str = "rule_based_heuristic";
pub const METHOD_SAFE_MODE_FALLBACK: &str = "safe_mode_fallback";
pub const METHOD_SAFE_MODE_DEFAULT: &str = "safe_mode_default";

/// Optimization score given to safe-mode parameter sets.
pub const SAFE_MODE_PARAMETER_CONFIDENCE: f64 = 0.3;

/// Inclusive search range for one parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub min: f64,
    pub max: f64,
}

impl ParameterBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Finite with `min <= max`.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    /// Clamp into the range; never panics, even on invalid bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Rejects caller-supplied bounds that are non-finite or inverted.
pub fn validate_bounds(bounds: &BTreeMap<String, ParameterBounds>) -> Result<()> {
    let invalid: Vec<String> = bounds
        .iter()
        .filter(|(_, b)| !b.is_valid())
        .map(|(name, b)| format!("{name}: [{}, {}]", b.min, b.max))
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(AdaptiveError::Validation(format!(
            "invalid parameter bounds: {}",
            invalid.join(", ")
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedStrategyParameters {
    pub strategy_name: String,
    pub optimization_id: String,
    pub market_state_id: Option<String>,
    pub optimized_for_regime: Option<MarketRegime>,
    pub parameters: BTreeMap<String, f64>,

    // Performance estimates
    pub expected_return: f64,
    pub expected_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,

    // Confidence metrics
    pub optimization_score: f64,
    pub parameter_stability: f64,
    pub out_of_sample_performance: f64,

    // Risk metrics
    pub var_95: f64,
    pub expected_shortfall: f64,
    pub maximum_loss: f64,

    pub optimization_method: String,
    pub iterations: u32,
    pub optimization_duration_ms: u64,
    pub created_at: DateTime<Utc>,
    pub version: Option<VersionStamp>,

    #[serde(default)]
    pub parameter_bounds: BTreeMap<String, ParameterBounds>,
    #[serde(default)]
    pub constraints: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub parameter_sensitivity: BTreeMap<String, f64>,
}

impl OptimizedStrategyParameters {
    /// Empty result for `strategy_name` produced by `method`.
    pub fn new(strategy_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            optimization_id: Uuid::new_v4().to_string(),
            market_state_id: None,
            optimized_for_regime: None,
            parameters: BTreeMap::new(),
            expected_return: 0.0,
            expected_volatility: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            win_rate: 0.0,
            optimization_score: 0.0,
            parameter_stability: 0.0,
            out_of_sample_performance: 0.0,
            var_95: 0.0,
            expected_shortfall: 0.0,
            maximum_loss: 0.0,
            optimization_method: method.into(),
            iterations: 0,
            optimization_duration_ms: 0,
            created_at: Utc::now(),
            version: None,
            parameter_bounds: BTreeMap::new(),
            constraints: BTreeMap::new(),
            parameter_sensitivity: BTreeMap::new(),
        }
    }

    /// Conservative non-learned parameter set for `strategy_name`.
    pub fn safe_mode(
        strategy_name: &str,
        market_state: Option<&MarketState>,
        method: &str,
    ) -> Self {
        let mut params = Self::new(strategy_name, method);
        params.parameters = safe_mode_parameter_set(strategy_name);
        params.optimization_score = SAFE_MODE_PARAMETER_CONFIDENCE;
        params.market_state_id = market_state.map(|s| s.state_id.clone());
        params.optimized_for_regime = market_state.map(|s| s.regime);
        params
    }

    pub fn for_market_state(mut self, market_state: Option<&MarketState>) -> Self {
        if let Some(state) = market_state {
            self.market_state_id = Some(state.state_id.clone());
            self.optimized_for_regime = Some(state.regime);
        }
        self
    }

    pub fn with_version(mut self, version: VersionStamp) -> Self {
        self.version = Some(version);
        self
    }

    /// Average of the strictly-positive confidence metrics; 0.0 when none is positive.
    pub fn get_confidence_score(&self) -> f64 {
        let positive: Vec<f64> = [
            self.optimization_score,
            self.parameter_stability,
            self.out_of_sample_performance,
        ]
        .into_iter()
        .filter(|v| *v > 0.0)
        .collect();

        if positive.is_empty() {
            return 0.0;
        }
        positive.iter().sum::<f64>() / positive.len() as f64
    }

    pub fn is_fallback(&self) -> bool {
        self.optimization_method == METHOD_SAFE_MODE_DEFAULT
            || self.optimization_method == METHOD_SAFE_MODE_FALLBACK
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }
}

/// Fixed conservative parameters per known strategy; generic defaults otherwise.
pub fn safe_mode_parameter_set(strategy_name: &str) -> BTreeMap<String, f64> {
    let entries: &[(&str, f64)] = match strategy_name {
        "iron_condor" => &[
            ("strike_delta", 0.16),
            ("days_to_expiry", 45.0),
            ("wing_width", 5.0),
            ("profit_target", 0.5),
            ("stop_loss", 2.0),
        ],
        "wheel" => &[
            ("put_delta", 0.30),
            ("call_delta", 0.30),
            ("days_to_expiry", 30.0),
            ("profit_target", 0.5),
        ],
        "pmcc" => &[
            ("long_call_delta", 0.80),
            ("long_days_to_expiry", 365.0),
            ("short_call_delta", 0.30),
            ("days_to_expiry", 30.0),
            ("profit_target", 0.5),
        ],
        "bull_put_spread" => &[
            ("short_put_delta", 0.30),
            ("spread_width", 5.0),
            ("days_to_expiry", 30.0),
            ("profit_target", 0.5),
            ("stop_loss", 2.0),
        ],
        _ => &[
            ("position_size", 0.02),
            ("days_to_expiry", 30.0),
            ("profit_target", 0.5),
            ("stop_loss", 2.0),
        ],
    };

    entries
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bounds_rejects_inverted_and_nan() {
        let mut bounds = BTreeMap::new();
        bounds.insert("strike_delta".to_string(), ParameterBounds::new(0.1, 0.3));
        assert!(validate_bounds(&bounds).is_ok());

        bounds.insert("profit_target".to_string(), ParameterBounds::new(0.3, 0.1));
        bounds.insert("days_to_expiry".to_string(), ParameterBounds::new(f64::NAN, 60.0));
        let err = validate_bounds(&bounds).unwrap_err();
        assert!(matches!(err, AdaptiveError::Validation(ref m)
            if m.contains("profit_target") && m.contains("days_to_expiry") && !m.contains("strike_delta")));
    }

    #[test]
    fn test_clamp_on_inverted_bounds_does_not_panic() {
        let b = ParameterBounds::new(0.3, 0.1);
        assert!(!b.is_valid());
        assert_eq!(b.clamp(0.2), 0.1);
        assert_eq!(ParameterBounds::new(0.1, 0.3).clamp(0.5), 0.3);
    }

    #[test]
    fn test_confidence_averages_positive_metrics_only() {
        let mut params = OptimizedStrategyParameters::new("wheel", METHOD_BAYESIAN_GP);
        params.optimization_score = 0.8;
        params.parameter_stability = 0.0;
        params.out_of_sample_performance = 0.4;
        assert!((params.get_confidence_score() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_all_zero_is_zero() {
        let mut params = OptimizedStrategyParameters::new("wheel", METHOD_BAYESIAN_GP);
        assert_eq!(params.get_confidence_score(), 0.0);

        params.optimization_score = -0.5;
        assert_eq!(params.get_confidence_score(), 0.0);
    }

    #[test]
    fn test_safe_mode_iron_condor() {
        let state = MarketState::default();
        let params =
            OptimizedStrategyParameters::safe_mode("iron_condor", Some(&state), METHOD_SAFE_MODE_DEFAULT);

        assert!(params.is_fallback());
        assert_eq!(params.get_confidence_score(), 0.3);
        assert_eq!(params.get("strike_delta"), Some(0.16));
        assert!(params.get("days_to_expiry").is_some());
        assert_eq!(params.market_state_id.as_deref(), Some(state.state_id.as_str()));
    }

    #[test]
    fn test_safe_mode_unknown_strategy_gets_generic_set() {
        let params = safe_mode_parameter_set("calendar_spread");
        assert!(params.contains_key("position_size"));
        assert!(params.contains_key("days_to_expiry"));
    }
}

//! Versioned capital-allocation plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::parameters::OptimizedStrategyParameters;
use super::version::VersionStamp;
use crate::error::{AdaptiveError, Result};

pub const ALLOCATION_SAFE_MODE_ORCHESTRATOR: &str = "safe_mode_orchestrator";
pub const ALLOCATION_DQN_POLICY: &str = "dqn_policy";
pub const ALLOCATION_RULE_BASED: &str = "rule_based";

/// Default tolerance for `is_balanced`.
pub const BALANCE_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConstraints {
    pub max_single_strategy_weight: f64,
    pub min_strategy_weight: f64,
    /// Ceiling on portfolio expected volatility
    pub max_total_risk: f64,
}

impl Default for AllocationConstraints {
    fn default() -> Self {
        Self {
            max_single_strategy_weight: 0.4,
            min_strategy_weight: 0.05,
            max_total_risk: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAllocation {
    pub allocation_id: String,
    pub portfolio_name: String,
    pub market_state_id: Option<String>,
    /// strategy -> weight in [0, 1]
    pub allocations: BTreeMap<String, f64>,
    pub strategy_parameters: BTreeMap<String, OptimizedStrategyParameters>,
    pub total_capital: f64,

    // Portfolio-level estimates
    pub expected_return: f64,
    pub expected_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub var_95: f64,

    pub constraints: AllocationConstraints,

    // Rebalance metadata
    pub rebalance_frequency: String,
    pub last_rebalance: Option<DateTime<Utc>>,
    pub next_rebalance: Option<DateTime<Utc>>,

    // Set by the orchestrator
    pub allocation_method: String,
    pub confidence_score: f64,
    pub anomaly_adjustment: f64,
    pub original_capital: f64,

    pub created_at: DateTime<Utc>,
    pub version: Option<VersionStamp>,
}

impl StrategyAllocation {
    pub fn new(portfolio_name: impl Into<String>, total_capital: f64) -> Self {
        Self {
            allocation_id: Uuid::new_v4().to_string(),
            portfolio_name: portfolio_name.into(),
            market_state_id: None,
            allocations: BTreeMap::new(),
            strategy_parameters: BTreeMap::new(),
            total_capital,
            expected_return: 0.0,
            expected_volatility: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            var_95: 0.0,
            constraints: AllocationConstraints::default(),
            rebalance_frequency: "weekly".to_string(),
            last_rebalance: None,
            next_rebalance: None,
            allocation_method: String::new(),
            confidence_score: 0.0,
            anomaly_adjustment: 1.0,
            original_capital: total_capital,
            created_at: Utc::now(),
            version: None,
        }
    }

    /// Add (or replace) a strategy weight.
    ///
    /// Whenever the running sum exceeds 1.0 every weight is divided by the sum,
    /// so adding a strategy can rescale weights assigned earlier.
    pub fn add_strategy(
        &mut self,
        strategy_name: &str,
        weight: f64,
        parameters: Option<OptimizedStrategyParameters>,
    ) -> Result<()> {
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            return Err(AdaptiveError::InvalidWeight {
                strategy: strategy_name.to_string(),
                weight,
            });
        }

        self.allocations.insert(strategy_name.to_string(), weight);
        if let Some(params) = parameters {
            self.strategy_parameters
                .insert(strategy_name.to_string(), params);
        }

        let total = self.total_weight();
        if total > 1.0 {
            for w in self.allocations.values_mut() {
                *w /= total;
            }
        }
        Ok(())
    }

    pub fn total_weight(&self) -> f64 {
        self.allocations.values().sum()
    }

    pub fn is_balanced(&self, tolerance: f64) -> bool {
        (self.total_weight() - 1.0).abs() <= tolerance
    }

    pub fn weight(&self, strategy_name: &str) -> f64 {
        self.allocations.get(strategy_name).copied().unwrap_or(0.0)
    }

    /// Capital assigned to a strategy at the current `total_capital`.
    pub fn capital_for(&self, strategy_name: &str) -> f64 {
        self.weight(strategy_name) * self.total_capital
    }

    pub fn capital_by_strategy(&self) -> BTreeMap<String, f64> {
        self.allocations
            .iter()
            .map(|(name, w)| (name.clone(), w * self.total_capital))
            .collect()
    }

    pub fn set_total_capital(&mut self, total_capital: f64) {
        self.total_capital = total_capital;
    }

    /// Human-readable constraint violations; nothing is corrected.
    pub fn validate_constraints(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let c = &self.constraints;

        for (name, weight) in &self.allocations {
            if *weight > c.max_single_strategy_weight {
                violations.push(format!(
                    "{name} weight {weight:.4} exceeds max single strategy weight {:.4}",
                    c.max_single_strategy_weight
                ));
            }
            if *weight > 0.0 && *weight < c.min_strategy_weight {
                violations.push(format!(
                    "{name} weight {weight:.4} below min strategy weight {:.4}",
                    c.min_strategy_weight
                ));
            }
        }

        let total = self.total_weight();
        if total > 1.0 + BALANCE_TOLERANCE {
            violations.push(format!("total weight {total:.4} exceeds 1.0"));
        }
        if self.expected_volatility > c.max_total_risk {
            violations.push(format!(
                "expected volatility {:.4} exceeds max total risk {:.4}",
                self.expected_volatility, c.max_total_risk
            ));
        }

        violations
    }

    /// Weighted portfolio estimates from the attached strategy parameters.
    pub fn recompute_portfolio_metrics(&mut self) {
        let mut expected_return = 0.0;
        let mut variance = 0.0;
        let mut drawdown = 0.0;
        let mut var_95 = 0.0;
        for (name, weight) in &self.allocations {
            if let Some(p) = self.strategy_parameters.get(name) {
                expected_return += weight * p.expected_return;
                // Uncorrelated approximation
                variance += (weight * p.expected_volatility).powi(2);
                drawdown += weight * p.max_drawdown.abs();
                var_95 += weight * p.var_95;
            }
        }
        self.expected_return = expected_return;
        self.expected_volatility = variance.sqrt();
        self.max_drawdown = drawdown;
        self.var_95 = var_95;
        self.sharpe_ratio = if self.expected_volatility > 0.0 {
            expected_return / self.expected_volatility
        } else {
            0.0
        };
    }

    pub fn with_version(mut self, version: VersionStamp) -> Self {
        self.version = Some(version);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_strategy_renormalizes_when_sum_exceeds_one() {
        let mut alloc = StrategyAllocation::new("test", 100_000.0);
        alloc.add_strategy("iron_condor", 0.6, None).unwrap();
        alloc.add_strategy("wheel", 0.3, None).unwrap();
        assert!((alloc.total_weight() - 0.9).abs() < 1e-12);
        assert!(!alloc.is_balanced(BALANCE_TOLERANCE));

        // 0.6 + 0.3 + 0.3 = 1.2 -> every weight divided by 1.2
        alloc.add_strategy("pmcc", 0.3, None).unwrap();
        assert!(alloc.is_balanced(BALANCE_TOLERANCE));
        assert!((alloc.weight("iron_condor") - 0.5).abs() < 1e-12);
        assert!((alloc.weight("wheel") - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_additions_stay_balanced() {
        let mut alloc = StrategyAllocation::new("test", 1.0);
        for (i, w) in [0.9, 0.8, 0.05, 1.0, 0.33, 0.7].iter().enumerate() {
            alloc.add_strategy(&format!("s{i}"), *w, None).unwrap();
            assert!(alloc.total_weight() <= 1.0 + 1e-9);
        }
        assert!(alloc.is_balanced(1e-3));
    }

    #[test]
    fn test_invalid_weights_are_rejected() {
        let mut alloc = StrategyAllocation::new("test", 1.0);
        assert!(matches!(
            alloc.add_strategy("wheel", -0.1, None),
            Err(AdaptiveError::InvalidWeight { .. })
        ));
        assert!(alloc.add_strategy("wheel", 1.01, None).is_err());
        assert!(alloc.add_strategy("wheel", f64::NAN, None).is_err());
        assert!(alloc.allocations.is_empty());
    }

    #[test]
    fn test_empty_allocation_balance_edge() {
        let alloc = StrategyAllocation::new("test", 1.0);
        assert!(!alloc.is_balanced(BALANCE_TOLERANCE));
        assert!(alloc.is_balanced(1.0));
    }

    #[test]
    fn test_validate_constraints_reports_without_correcting() {
        let mut alloc = StrategyAllocation::new("test", 10_000.0);
        alloc.add_strategy("iron_condor", 0.5, None).unwrap();
        alloc.add_strategy("wheel", 0.01, None).unwrap();
        alloc.expected_volatility = 0.5;

        let violations = alloc.validate_constraints();
        assert_eq!(violations.len(), 3);
        assert_eq!(alloc.weight("iron_condor"), 0.5);
        assert_eq!(alloc.capital_for("iron_condor"), 5_000.0);
    }
}

//! Safe-mode fallbacks used when a learner is absent or fails.

use chrono::{Duration, Utc};

use crate::domain::{
    MarketState, OptimizedStrategyParameters, StrategyAllocation, VersionStamp,
    ALLOCATION_SAFE_MODE_ORCHESTRATOR, METHOD_SAFE_MODE_DEFAULT,
};

pub const SAFE_MODE_ALLOCATION_CONFIDENCE: f64 = 0.2;

/// Fixed small parameter set for `strategy_id`, tagged `safe_mode_default`.
pub fn safe_mode_parameters(
    strategy_id: &str,
    market_state: Option<&MarketState>,
    version: &VersionStamp,
) -> OptimizedStrategyParameters {
    OptimizedStrategyParameters::safe_mode(strategy_id, market_state, METHOD_SAFE_MODE_DEFAULT)
        .with_version(version.clone())
}

/// Equal split across `strategies`, each with its safe-mode parameters attached.
///
/// The `1/n` weights are inserted directly, so this path has no error case.
pub fn safe_mode_allocation(
    portfolio_name: &str,
    strategies: &[String],
    market_state: &MarketState,
    total_capital: f64,
    version: &VersionStamp,
) -> StrategyAllocation {
    let mut allocation = StrategyAllocation::new(portfolio_name, total_capital);
    allocation.market_state_id = Some(market_state.state_id.clone());

    if !strategies.is_empty() {
        let weight = 1.0 / strategies.len() as f64;
        for strategy in strategies {
            allocation.allocations.insert(strategy.clone(), weight);
            allocation.strategy_parameters.insert(
                strategy.clone(),
                safe_mode_parameters(strategy, Some(market_state), version),
            );
        }
    }

    let now = Utc::now();
    allocation.last_rebalance = Some(now);
    allocation.next_rebalance = Some(now + Duration::days(7));
    allocation.allocation_method = ALLOCATION_SAFE_MODE_ORCHESTRATOR.to_string();
    allocation.confidence_score = SAFE_MODE_ALLOCATION_CONFIDENCE;
    allocation.recompute_portfolio_metrics();
    allocation.with_version(version.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SAFE_MODE_STRATEGIES;
    use crate::domain::BALANCE_TOLERANCE;

    fn strategies() -> Vec<String> {
        DEFAULT_SAFE_MODE_STRATEGIES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_safe_mode_allocation_is_balanced_and_tagged() {
        let state = MarketState::default();
        let allocation = safe_mode_allocation(
            "adaptive_options",
            &strategies(),
            &state,
            75_000.0,
            &VersionStamp::new("test"),
        );

        assert_eq!(allocation.allocation_method, ALLOCATION_SAFE_MODE_ORCHESTRATOR);
        assert_eq!(allocation.confidence_score, SAFE_MODE_ALLOCATION_CONFIDENCE);
        assert!(allocation.is_balanced(BALANCE_TOLERANCE));
        assert!(allocation.validate_constraints().is_empty());
        assert_eq!(allocation.total_capital, 75_000.0);
        assert_eq!(allocation.capital_for("wheel"), 18_750.0);
        assert_eq!(allocation.strategy_parameters.len(), 4);
        assert!(allocation.strategy_parameters["pmcc"].is_fallback());
        assert!(allocation.version.is_some());
    }

    #[test]
    fn test_safe_mode_parameters_carry_version() {
        let version = VersionStamp::new("2.0.0");
        let params = safe_mode_parameters("iron_condor", None, &version);
        assert_eq!(params.optimization_method, METHOD_SAFE_MODE_DEFAULT);
        assert_eq!(params.version, Some(version));
        assert!(params.get("strike_delta").is_some());
    }
}

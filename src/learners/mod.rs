//! Learner capability interfaces.
//!
//! The orchestrator only talks to these traits. Each capability ships a
//! learned-model variant and a rule-based variant; which one runs is decided
//! when the orchestrator is constructed.

pub mod allocation;
pub mod anomaly;
pub mod optimizer;
pub mod stats;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::domain::{
    BacktestResult, MarketDataPoint, MarketState, OptimizedStrategyParameters, ParameterBounds,
    StrategyAllocation,
};
use crate::error::Result;

pub use allocation::{PolicyAllocationAgent, PolicyAgentConfig, RuleBasedAllocationAgent};
pub use anomaly::{
    AnomalyRationale, AnomalySeverity, AutoencoderDetector, AutoencoderDetectorConfig,
    DetectionReport, ZScoreDetector,
};
pub use optimizer::{GaussianProcessConfig, GaussianProcessOptimizer, HeuristicOptimizer};

/// Learns strategy parameters from historical performance samples
#[async_trait]
pub trait ParameterOptimizer: Send + Sync {
    fn name(&self) -> &str;

    /// Record a completed backtest as a new observation.
    async fn update(&self, result: &BacktestResult) -> Result<()>;

    /// Suggest parameters for `strategy_id`.
    ///
    /// Returns `AdaptiveError::InsufficientData` when there is not enough history.
    async fn suggest_parameters(
        &self,
        strategy_id: &str,
        parameter_bounds: Option<&BTreeMap<String, ParameterBounds>>,
        market_state: Option<&MarketState>,
    ) -> Result<OptimizedStrategyParameters>;

    async fn sample_count(&self, strategy_id: &str) -> usize;
}

/// Flags anomalous market windows by reconstruction error (or a rule-based proxy)
#[async_trait]
pub trait AnomalyDetector: Send + Sync {
    fn name(&self) -> &str;

    fn is_trained(&self) -> bool;

    /// Calibrate the detector on a window of normal market data.
    async fn train(&self, history: &[MarketDataPoint]) -> Result<()>;

    async fn detect(
        &self,
        market_data: &[MarketDataPoint],
        market_state: Option<&MarketState>,
    ) -> Result<DetectionReport>;
}

/// Splits capital across strategies for a market state
#[async_trait]
pub trait AllocationAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn get_strategy_allocation(
        &self,
        market_state: &MarketState,
        total_capital: f64,
    ) -> Result<StrategyAllocation>;

    /// Preference distribution over strategies (sums to 1).
    async fn action_preferences(&self, market_state: &MarketState) -> Result<BTreeMap<String, f64>>;

    /// Reward signal from a completed backtest, kept for later training.
    async fn observe_reward(&self, _strategy_id: &str, _reward: f64) -> Result<()> {
        Ok(())
    }
}

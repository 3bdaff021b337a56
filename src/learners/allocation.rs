//! Capital allocation agents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

use super::AllocationAgent;
use crate::config::DEFAULT_SAFE_MODE_STRATEGIES;
use crate::domain::{
    MarketRegime, MarketState, StrategyAllocation, ALLOCATION_DQN_POLICY, ALLOCATION_RULE_BASED,
};
use crate::error::{AdaptiveError, Result};
use crate::ml::{softmax, DenseNetwork};

#[derive(Debug, Clone)]
pub struct PolicyAgentConfig {
    /// Strategy per Q-network output, in output order
    pub strategies: Vec<String>,
    pub temperature: f64,
    pub max_single_strategy_weight: f64,
    /// Weights below this are dropped and the rest renormalised
    pub min_strategy_weight: f64,
    pub experience_capacity: usize,
    pub portfolio_name: String,
}

impl Default for PolicyAgentConfig {
    fn default() -> Self {
        Self {
            strategies: DEFAULT_SAFE_MODE_STRATEGIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            temperature: 1.0,
            max_single_strategy_weight: 0.4,
            min_strategy_weight: 0.05,
            experience_capacity: 1000,
            portfolio_name: "adaptive_options".to_string(),
        }
    }
}

/// Reward observed for a strategy, kept for offline policy training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub strategy_id: String,
    pub reward: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Cap weights at `cap`, redistributing the excess over uncapped entries.
fn cap_weights(weights: &mut [f64], cap: f64) {
    for _ in 0..weights.len() {
        let excess: f64 = weights.iter().map(|w| (w - cap).max(0.0)).sum();
        if excess <= 1e-12 {
            return;
        }
        let free: f64 = weights.iter().filter(|w| **w < cap).sum();
        for w in weights.iter_mut() {
            if *w >= cap {
                *w = cap;
            } else if free > 0.0 {
                *w += excess * (*w / free);
            }
        }
        if free <= 0.0 {
            return;
        }
    }
}

/// Drop weights below `floor`, renormalise, then cap at `cap`.
///
/// Capping only raises uncapped entries, so nothing falls back under the floor.
/// `None` when every weight is dropped or the survivors cannot sum to 1 under the cap.
fn shape_weights(preferences: &[f64], cap: f64, floor: f64) -> Option<Vec<f64>> {
    let mut weights: Vec<f64> = preferences
        .iter()
        .map(|w| if *w < floor { 0.0 } else { *w })
        .collect();
    let kept: f64 = weights.iter().sum();
    let survivors = weights.iter().filter(|w| **w > 0.0).count();
    if kept <= 0.0 || (survivors as f64) * cap < 1.0 - 1e-9 {
        return None;
    }
    for w in weights.iter_mut() {
        *w /= kept;
    }
    cap_weights(&mut weights, cap);
    Some(weights)
}

/// Normalised entropy complement: 1 for a one-hot distribution, 0 for uniform.
fn decisiveness(preferences: &[f64]) -> f64 {
    if preferences.len() < 2 {
        return 1.0;
    }
    let entropy: f64 = preferences
        .iter()
        .filter(|p| **p > 0.0)
        .map(|p| -p * p.ln())
        .sum();
    (1.0 - entropy / (preferences.len() as f64).ln()).clamp(0.0, 1.0)
}

/// Learned allocator: softmax over Q-network action values
pub struct PolicyAllocationAgent {
    config: PolicyAgentConfig,
    q_network: DenseNetwork,
    experience: RwLock<VecDeque<Experience>>,
}

impl PolicyAllocationAgent {
    pub fn new(q_network: DenseNetwork, config: PolicyAgentConfig) -> Result<Self> {
        q_network.validate().map_err(AdaptiveError::Validation)?;
        if q_network.output_dim() != config.strategies.len() {
            return Err(AdaptiveError::Validation(format!(
                "Q-network has {} outputs for {} strategies",
                q_network.output_dim(),
                config.strategies.len()
            )));
        }
        Ok(Self {
            config,
            q_network,
            experience: RwLock::new(VecDeque::new()),
        })
    }

    pub fn model_version(&self) -> Option<String> {
        self.q_network.model_version()
    }

    pub async fn experience_len(&self) -> usize {
        self.experience.read().await.len()
    }

    pub async fn experience(&self) -> Vec<Experience> {
        self.experience.read().await.iter().cloned().collect()
    }

    fn preference_vector(&self, market_state: &MarketState) -> Result<Vec<f64>> {
        let q_values = self.q_network.forward(&market_state.feature_values())?;
        Ok(softmax(&q_values, self.config.temperature))
    }
}

#[async_trait]
impl AllocationAgent for PolicyAllocationAgent {
    fn name(&self) -> &str {
        "rl_agent"
    }

    async fn get_strategy_allocation(
        &self,
        market_state: &MarketState,
        total_capital: f64,
    ) -> Result<StrategyAllocation> {
        let preferences = self.preference_vector(market_state)?;

        let weights = shape_weights(
            &preferences,
            self.config.max_single_strategy_weight,
            self.config.min_strategy_weight,
        )
        .ok_or_else(|| {
            AdaptiveError::component(
                self.name(),
                "no weighting satisfies the min/max strategy weight constraints",
            )
        })?;

        let mut allocation = StrategyAllocation::new(&self.config.portfolio_name, total_capital);
        allocation.market_state_id = Some(market_state.state_id.clone());
        allocation.constraints.max_single_strategy_weight = self.config.max_single_strategy_weight;
        allocation.constraints.min_strategy_weight = self.config.min_strategy_weight;
        for (strategy, w) in self.config.strategies.iter().zip(&weights) {
            if *w > 0.0 {
                allocation.add_strategy(strategy, *w, None)?;
            }
        }
        allocation.allocation_method = ALLOCATION_DQN_POLICY.to_string();
        allocation.confidence_score = decisiveness(&preferences);

        debug!(
            state = %market_state.state_id,
            strategies = allocation.allocations.len(),
            confidence = allocation.confidence_score,
            "Policy allocation computed"
        );
        Ok(allocation)
    }

    async fn action_preferences(&self, market_state: &MarketState) -> Result<BTreeMap<String, f64>> {
        let preferences = self.preference_vector(market_state)?;
        Ok(self
            .config
            .strategies
            .iter()
            .cloned()
            .zip(preferences)
            .collect())
    }

    async fn observe_reward(&self, strategy_id: &str, reward: f64) -> Result<()> {
        let mut experience = self.experience.write().await;
        experience.push_back(Experience {
            strategy_id: strategy_id.to_string(),
            reward,
            recorded_at: Utc::now(),
        });
        while experience.len() > self.config.experience_capacity {
            experience.pop_front();
        }
        Ok(())
    }
}

/// Rule-based allocator: fixed weight tables keyed by regime
pub struct RuleBasedAllocationAgent {
    portfolio_name: String,
}

impl RuleBasedAllocationAgent {
    pub fn new(portfolio_name: impl Into<String>) -> Self {
        Self {
            portfolio_name: portfolio_name.into(),
        }
    }

    fn table(regime: MarketRegime) -> [(&'static str, f64); 4] {
        match regime {
            MarketRegime::Bull | MarketRegime::Trending => [
                ("pmcc", 0.35),
                ("bull_put_spread", 0.35),
                ("wheel", 0.2),
                ("iron_condor", 0.1),
            ],
            MarketRegime::Bear => [
                ("iron_condor", 0.4),
                ("wheel", 0.3),
                ("bull_put_spread", 0.15),
                ("pmcc", 0.15),
            ],
            MarketRegime::HighVolatility => [
                ("iron_condor", 0.4),
                ("bull_put_spread", 0.3),
                ("wheel", 0.2),
                ("pmcc", 0.1),
            ],
            MarketRegime::Sideways | MarketRegime::MeanReverting | MarketRegime::LowVolatility => [
                ("iron_condor", 0.4),
                ("wheel", 0.3),
                ("bull_put_spread", 0.2),
                ("pmcc", 0.1),
            ],
        }
    }
}

impl Default for RuleBasedAllocationAgent {
    fn default() -> Self {
        Self::new("adaptive_options")
    }
}

#[async_trait]
impl AllocationAgent for RuleBasedAllocationAgent {
    fn name(&self) -> &str {
        "rule_based_agent"
    }

    async fn get_strategy_allocation(
        &self,
        market_state: &MarketState,
        total_capital: f64,
    ) -> Result<StrategyAllocation> {
        let mut allocation = StrategyAllocation::new(&self.portfolio_name, total_capital);
        allocation.market_state_id = Some(market_state.state_id.clone());
        for (strategy, weight) in Self::table(market_state.regime) {
            allocation.add_strategy(strategy, weight, None)?;
        }
        allocation.allocation_method = ALLOCATION_RULE_BASED.to_string();
        allocation.confidence_score = 0.5;
        Ok(allocation)
    }

    async fn action_preferences(&self, market_state: &MarketState) -> Result<BTreeMap<String, f64>> {
        Ok(Self::table(market_state.regime)
            .iter()
            .map(|(s, w)| (s.to_string(), *w))
            .collect())
    }
}

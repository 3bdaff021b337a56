//! Backtest Reward
//!
//! Scalar reward fed to the allocation agent after every completed backtest.

use serde::{Deserialize, Serialize};

use crate::domain::BacktestResult;

/// Rewards are squashed into `(-REWARD_BOUND, REWARD_BOUND)`.
pub const REWARD_BOUND: f64 = 10.0;

/// Component weights for the raw (unsquashed) reward
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RewardWeights {
    pub sharpe_weight: f64,
    /// Applied to `win_rate - 0.5`
    pub win_rate_weight: f64,
    /// Applied to `|max_drawdown|`
    pub drawdown_weight: f64,
    pub return_weight: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            sharpe_weight: 2.0,
            win_rate_weight: 4.0,
            drawdown_weight: 10.0,
            return_weight: 5.0,
        }
    }
}

/// Reward broken into its components, for the audit log
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub sharpe_component: f64,
    pub win_rate_component: f64,
    pub drawdown_penalty: f64,
    pub return_component: f64,
    pub raw: f64,
    pub total: f64,
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Deterministic reward for a backtest.
///
/// The weighted sum is squashed into the bound with `tanh`, which keeps it
/// monotone in every input.
pub fn reward_breakdown(result: &BacktestResult, weights: &RewardWeights) -> RewardBreakdown {
    let sharpe_component = weights.sharpe_weight * finite_or_zero(result.sharpe_ratio);
    let win_rate_component = weights.win_rate_weight * (finite_or_zero(result.win_rate) - 0.5);
    let drawdown_penalty = weights.drawdown_weight * finite_or_zero(result.max_drawdown).abs();
    let return_component = weights.return_weight * finite_or_zero(result.total_return);

    let raw = sharpe_component + win_rate_component - drawdown_penalty + return_component;
    RewardBreakdown {
        sharpe_component,
        win_rate_component,
        drawdown_penalty,
        return_component,
        raw,
        total: REWARD_BOUND * (raw / REWARD_BOUND).tanh(),
    }
}

pub fn calculate_reward(result: &BacktestResult) -> f64 {
    reward_breakdown(result, &RewardWeights::default()).total
}

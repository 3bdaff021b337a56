//! Backtest completion events routed to the learners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::market::{MarketDataPoint, MarketRegime, MarketState};

/// Result of one completed backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_id: String,
    /// Parameter values the backtest ran with
    pub parameters: BTreeMap<String, f64>,
    pub sharpe_ratio: f64,
    /// Fraction of winning trades in [0, 1]
    pub win_rate: f64,
    /// Peak-to-trough loss as a fraction; sign is ignored
    pub max_drawdown: f64,
    /// Total return as a fraction (0.12 = +12%)
    pub total_return: f64,
    #[serde(default)]
    pub num_trades: u32,
    /// Market window the backtest covered, if the runner embedded it
    #[serde(default)]
    pub market_data: Option<Vec<MarketDataPoint>>,
    #[serde(default)]
    pub market_state: Option<MarketState>,
    pub completed_at: DateTime<Utc>,
}

impl BacktestResult {
    pub fn new(strategy_id: impl Into<String>, parameters: BTreeMap<String, f64>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            parameters,
            sharpe_ratio: 0.0,
            win_rate: 0.0,
            max_drawdown: 0.0,
            total_return: 0.0,
            num_trades: 0,
            market_data: None,
            market_state: None,
            completed_at: Utc::now(),
        }
    }

    pub fn with_metrics(
        mut self,
        sharpe_ratio: f64,
        win_rate: f64,
        max_drawdown: f64,
        total_return: f64,
    ) -> Self {
        self.sharpe_ratio = sharpe_ratio;
        self.win_rate = win_rate;
        self.max_drawdown = max_drawdown;
        self.total_return = total_return;
        self
    }

    pub fn with_market_data(mut self, market_data: Vec<MarketDataPoint>) -> Self {
        self.market_data = Some(market_data);
        self
    }

    /// Observation for the parameter optimizer.
    pub fn to_sample(&self) -> PerformanceSample {
        PerformanceSample {
            strategy_id: self.strategy_id.clone(),
            parameters: self.parameters.clone(),
            objective: self.sharpe_ratio,
            total_return: self.total_return,
            max_drawdown: self.max_drawdown.abs(),
            win_rate: self.win_rate,
            regime: self.market_state.as_ref().map(|s| s.regime),
            observed_at: self.completed_at,
        }
    }
}

/// One (parameters -> performance) observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub strategy_id: String,
    pub parameters: BTreeMap<String, f64>,
    /// Value the optimizer maximises (Sharpe ratio)
    pub objective: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub regime: Option<MarketRegime>,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_uses_absolute_drawdown() {
        let mut params = BTreeMap::new();
        params.insert("strike_delta".to_string(), 0.16);
        let result = BacktestResult::new("iron_condor", params).with_metrics(1.4, 0.7, -0.12, 0.08);

        let sample = result.to_sample();
        assert_eq!(sample.objective, 1.4);
        assert_eq!(sample.max_drawdown, 0.12);
        assert_eq!(sample.regime, None);
        assert_eq!(sample.parameters["strike_delta"], 0.16);
    }
}

//! Seeded synthetic market data for the demo commands.

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use crate::domain::{BacktestResult, MarketDataPoint, MarketRegime, MarketState, VolatilityEnvironment};

/// Calm one-minute bars around `start_price` (~0.2% moves).
pub fn calm_bars(rng: &mut StdRng, n: usize, start_price: f64) -> Vec<MarketDataPoint> {
    let start = Utc::now() - Duration::minutes(n as i64);
    let mut price = start_price;
    (0..n)
        .map(|i| {
            let open = price;
            let close = open * (1.0 + rng.gen_range(-0.002..0.002));
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.001));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.001));
            price = close;
            MarketDataPoint {
                timestamp: start + Duration::minutes(i as i64),
                open,
                high,
                low,
                close,
                volume: rng.gen_range(900.0..1_100.0),
                implied_vol: Some(rng.gen_range(0.18..0.22)),
            }
        })
        .collect()
}

/// A 10% gap down on heavy volume with an IV spike.
pub fn crash_bar(previous: Option<&MarketDataPoint>) -> MarketDataPoint {
    let open = previous.map(|p| p.close).unwrap_or(100.0);
    MarketDataPoint {
        timestamp: previous
            .map(|p| p.timestamp + Duration::minutes(1))
            .unwrap_or_else(Utc::now),
        open,
        high: open,
        low: open * 0.88,
        close: open * 0.90,
        volume: 50_000.0,
        implied_vol: Some(0.65),
    }
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn market_state(vix: f64, regime: MarketRegime) -> MarketState {
    let mut state = MarketState::new(regime, VolatilityEnvironment::from_vix(vix));
    state.vix = vix;
    state.underlying_price = 450.0;
    state.implied_vol = vix / 100.0;
    state
}

/// Backtest of `strategy` with its key parameters jittered around common values.
pub fn backtest(rng: &mut StdRng, strategy: &str) -> BacktestResult {
    let mut params = BTreeMap::new();
    params.insert("days_to_expiry".to_string(), rng.gen_range(21.0..60.0_f64).round());
    params.insert("profit_target".to_string(), rng.gen_range(0.3..0.7));
    params.insert("delta".to_string(), rng.gen_range(0.1..0.35));

    let sharpe = rng.gen_range(-0.5..2.5);
    BacktestResult::new(strategy, params).with_metrics(
        sharpe,
        rng.gen_range(0.4..0.85),
        rng.gen_range(0.02..0.25),
        sharpe * 0.04,
    )
}

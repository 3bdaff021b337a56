use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::synthetic;
use crate::config::AppConfig;
use crate::domain::MarketRegime;
use crate::error::Result;
use crate::learners::{AnomalyDetector, ZScoreDetector};
use crate::orchestrator::{AdaptiveLearningManager, Learners};

const CALIBRATION_BARS: usize = 120;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Z-score detector calibrated on a calm synthetic window.
async fn calibrated_detector(seed: u64) -> Result<Arc<ZScoreDetector>> {
    let detector = ZScoreDetector::default();
    let history = synthetic::calm_bars(&mut synthetic::rng(seed), CALIBRATION_BARS, 450.0);
    detector.train(&history).await?;
    Ok(Arc::new(detector))
}

fn rule_based_manager(config: &AppConfig, detector: Arc<ZScoreDetector>) -> Result<AdaptiveLearningManager> {
    AdaptiveLearningManager::new(
        config.adaptive.clone(),
        config.orchestrator.clone(),
        Learners::rule_based(&config.orchestrator.portfolio_name).with_detector(detector),
    )
}

pub async fn run_status(config: &AppConfig) -> Result<()> {
    let manager = AdaptiveLearningManager::new(
        config.adaptive.clone(),
        config.orchestrator.clone(),
        Learners::none(),
    )?;
    print_json(&manager.get_orchestration_status().await)
}

pub async fn run_demo(config: &AppConfig, capital: f64, shock: bool, seed: u64) -> Result<()> {
    let manager = rule_based_manager(config, calibrated_detector(seed).await?)?;
    let mut rng = synthetic::rng(seed.wrapping_add(1));

    let strategies = config.orchestrator.safe_mode_strategies.clone();
    for round in 0..3 {
        for strategy in &strategies {
            let mut result = synthetic::backtest(&mut rng, strategy);
            let mut window = synthetic::calm_bars(&mut rng, 30, 450.0);
            if shock && round == 2 {
                let crash = synthetic::crash_bar(window.last());
                window.push(crash);
            }
            result = result.with_market_data(window);

            let summary = manager.on_backtest_complete(&result).await;
            info!(
                strategy = %strategy,
                reward = summary.rl_reward,
                "Demo backtest processed"
            );
        }
    }

    let state = synthetic::market_state(if shock { 34.0 } else { 17.0 }, MarketRegime::Sideways);
    let mut parameters = Vec::with_capacity(strategies.len());
    for strategy in &strategies {
        parameters.push(manager.get_parameters(strategy, Some(&state)).await);
    }
    let allocation = manager.get_strategy_allocation(&state, capital).await;
    if allocation.anomaly_adjustment < 1.0 {
        warn!(
            original = allocation.original_capital,
            adjusted = allocation.total_capital,
            "Demo allocation throttled by anomaly state"
        );
    }

    print_json(&json!({
        "parameters": parameters,
        "allocation": allocation,
        "capital_by_strategy": allocation.capital_by_strategy(),
        "status": manager.get_orchestration_status().await,
        "audit_entries": manager.orchestration_log_len(),
    }))
}

pub async fn run_evaluate(config: &AppConfig, bars: usize, shock: bool, seed: u64) -> Result<()> {
    let manager = rule_based_manager(config, calibrated_detector(seed).await?)?;

    let mut window = synthetic::calm_bars(&mut synthetic::rng(seed.wrapping_add(1)), bars.max(1), 450.0);
    if shock {
        let crash = synthetic::crash_bar(window.last());
        window.push(crash);
    }
    let state = synthetic::market_state(if shock { 34.0 } else { 17.0 }, MarketRegime::Sideways);

    let report = manager.evaluate_market_conditions(&window, Some(&state)).await;
    print_json(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calibrated_detector_flags_synthetic_crash() {
        let detector = calibrated_detector(11).await.unwrap();
        assert!(detector.is_trained());

        let mut window = synthetic::calm_bars(&mut synthetic::rng(12), 10, 450.0);
        let crash = synthetic::crash_bar(window.last());
        window.push(crash);
        let report = detector.detect(&window, None).await.unwrap();
        assert!(report.anomalies_detected);
        assert!(report.rationale.anomalous_points.contains(&10));
    }

    #[tokio::test]
    async fn test_commands_run_with_default_config() {
        let config = AppConfig::default();
        run_status(&config).await.unwrap();
        run_evaluate(&config, 10, true, 5).await.unwrap();
        run_demo(&config, 50_000.0, false, 5).await.unwrap();
    }
}

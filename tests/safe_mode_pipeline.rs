use adaptive_options::domain::{
    ALLOCATION_SAFE_MODE_ORCHESTRATOR, BALANCE_TOLERANCE, METHOD_SAFE_MODE_DEFAULT,
};
use adaptive_options::orchestrator::{
    EVENT_ALLOCATION_REQUEST, EVENT_BACKTEST_COMPLETE, EVENT_MARKET_EVALUATION,
    EVENT_PARAMETER_REQUEST,
};
use adaptive_options::{AdaptiveLearningManager, BacktestResult, MarketState};
use std::collections::BTreeMap;

/// With no learners registered every decision still comes back usable.
#[tokio::test]
async fn safe_mode_end_to_end_without_learners() {
    let manager = AdaptiveLearningManager::with_defaults().expect("default config is valid");
    let state = MarketState::default();

    let params = manager.get_parameters("iron_condor", Some(&state)).await;
    assert_eq!(params.optimization_method, METHOD_SAFE_MODE_DEFAULT);
    assert_eq!(params.get_confidence_score(), 0.3);
    assert!(params.parameters.contains_key("strike_delta"));
    assert!(params.parameters.contains_key("days_to_expiry"));
    assert_eq!(params.version.as_ref().map(|v| v.code_version.as_str()), Some(env!("CARGO_PKG_VERSION")));

    let allocation = manager.get_strategy_allocation(&state, 75_000.0).await;
    assert_eq!(allocation.allocation_method, ALLOCATION_SAFE_MODE_ORCHESTRATOR);
    assert_eq!(allocation.confidence_score, 0.2);
    assert!(allocation.is_balanced(BALANCE_TOLERANCE));
    assert_eq!(allocation.total_capital, 75_000.0);
    assert_eq!(allocation.market_state_id.as_deref(), Some(state.state_id.as_str()));
}

/// Unknown strategies get the generic safe-mode set.
#[tokio::test]
async fn unknown_strategy_gets_generic_defaults() {
    let manager = AdaptiveLearningManager::with_defaults().unwrap();
    let params = manager.get_parameters("calendar_spread", None).await;
    assert!(params.is_fallback());
    assert!(params.parameters.contains_key("position_size"));
    assert!(params.market_state_id.is_none());
}

/// Every public decision appends exactly one audit entry; clearing empties the log.
#[tokio::test]
async fn every_operation_logs_exactly_once() {
    let manager = AdaptiveLearningManager::with_defaults().unwrap();
    let state = MarketState::default();
    let backtest = BacktestResult::new("wheel", BTreeMap::new()).with_metrics(1.0, 0.6, 0.1, 0.05);

    manager.on_backtest_complete(&backtest).await;
    assert_eq!(manager.orchestration_log_len(), 1);
    manager.get_parameters("wheel", Some(&state)).await;
    assert_eq!(manager.orchestration_log_len(), 2);
    manager.get_strategy_allocation(&state, 10_000.0).await;
    assert_eq!(manager.orchestration_log_len(), 3);
    manager.evaluate_market_conditions(&[], Some(&state)).await;
    assert_eq!(manager.orchestration_log_len(), 4);

    // Status and reward are read-only
    manager.get_orchestration_status().await;
    manager.calculate_rl_reward(&backtest);
    assert_eq!(manager.orchestration_log_len(), 4);

    let events: Vec<String> = manager
        .orchestration_logs()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        events,
        vec![
            EVENT_BACKTEST_COMPLETE,
            EVENT_PARAMETER_REQUEST,
            EVENT_ALLOCATION_REQUEST,
            EVENT_MARKET_EVALUATION
        ]
    );

    let exported = manager.export_orchestration_logs().unwrap();
    assert_eq!(exported.as_array().map(|a| a.len()), Some(4));
    assert_eq!(exported[2]["data"]["fallback_reason"], "no allocation agent registered");
    assert_eq!(exported[0]["components"]["adaptive_manager"], true);
    assert_eq!(exported[0]["components"]["rl_agent"], false);

    manager.clear_orchestration_logs();
    assert_eq!(manager.orchestration_log_len(), 0);
}

/// Reward is monotone in sharpe and win rate, and decreasing in drawdown magnitude.
#[test]
fn rl_reward_monotonicity() {
    let manager = AdaptiveLearningManager::with_defaults().unwrap();
    let reward = |sharpe: f64, win: f64, dd: f64| {
        manager.calculate_rl_reward(
            &BacktestResult::new("pmcc", BTreeMap::new()).with_metrics(sharpe, win, dd, 0.02),
        )
    };

    let sharpes = [-1.0, 0.0, 0.5, 1.0, 2.0, 4.0];
    for pair in sharpes.windows(2) {
        assert!(reward(pair[1], 0.6, 0.1) > reward(pair[0], 0.6, 0.1));
    }
    let win_rates = [0.1, 0.3, 0.5, 0.7, 0.9];
    for pair in win_rates.windows(2) {
        assert!(reward(1.0, pair[1], 0.1) > reward(1.0, pair[0], 0.1));
    }
    let drawdowns = [0.0, 0.05, 0.1, 0.3, 0.6];
    for pair in drawdowns.windows(2) {
        assert!(reward(1.0, 0.6, pair[1]) < reward(1.0, 0.6, pair[0]));
        assert!(reward(1.0, 0.6, -pair[1]) < reward(1.0, 0.6, -pair[0]));
    }
    assert!(reward(100.0, 1.0, 0.0) <= 10.0);
    assert!(reward(-100.0, 0.0, 1.0) >= -10.0);
}

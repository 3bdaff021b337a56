use adaptive_options::adaptive::AnalysisStatus;
use adaptive_options::domain::{
    ParameterBounds, ALLOCATION_SAFE_MODE_ORCHESTRATOR, BALANCE_TOLERANCE,
    METHOD_SAFE_MODE_DEFAULT,
};
use adaptive_options::learners::{
    AllocationAgent, AnomalyDetector, GaussianProcessConfig, GaussianProcessOptimizer, HeuristicOptimizer,
    ParameterOptimizer,
};
use adaptive_options::orchestrator::UpdateStatus;
use adaptive_options::{
    AdaptiveError, AdaptiveLearningManager, AdaptiveManagerConfig, BacktestResult,
    DetectionReport, Learners, MarketDataPoint, MarketState, OptimizedStrategyParameters,
    OrchestratorConfig, Result, StrategyAllocation,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

struct BrokenOptimizer;

#[async_trait]
impl ParameterOptimizer for BrokenOptimizer {
    fn name(&self) -> &str {
        "broken_optimizer"
    }

    async fn update(&self, _result: &BacktestResult) -> Result<()> {
        Err(AdaptiveError::component("broken_optimizer", "sample store offline"))
    }

    async fn suggest_parameters(
        &self,
        _strategy_id: &str,
        _parameter_bounds: Option<&BTreeMap<String, ParameterBounds>>,
        _market_state: Option<&MarketState>,
    ) -> Result<OptimizedStrategyParameters> {
        Err(AdaptiveError::component("broken_optimizer", "cholesky failed"))
    }

    async fn sample_count(&self, _strategy_id: &str) -> usize {
        0
    }
}

/// Claims to be trained but fails every detection.
struct BrokenDetector;

#[async_trait]
impl AnomalyDetector for BrokenDetector {
    fn name(&self) -> &str {
        "broken_detector"
    }

    fn is_trained(&self) -> bool {
        true
    }

    async fn train(&self, _history: &[MarketDataPoint]) -> Result<()> {
        Ok(())
    }

    async fn detect(
        &self,
        _market_data: &[MarketDataPoint],
        _market_state: Option<&MarketState>,
    ) -> Result<DetectionReport> {
        Err(AdaptiveError::ModelUnavailable("weights failed to load".to_string()))
    }
}

struct BrokenAgent;

#[async_trait]
impl AllocationAgent for BrokenAgent {
    fn name(&self) -> &str {
        "broken_agent"
    }

    async fn get_strategy_allocation(
        &self,
        _market_state: &MarketState,
        _total_capital: f64,
    ) -> Result<StrategyAllocation> {
        Err(AdaptiveError::component("broken_agent", "q-network shape mismatch"))
    }

    async fn action_preferences(&self, _market_state: &MarketState) -> Result<BTreeMap<String, f64>> {
        Err(AdaptiveError::component("broken_agent", "q-network shape mismatch"))
    }

    async fn observe_reward(&self, _strategy_id: &str, _reward: f64) -> Result<()> {
        Err(AdaptiveError::component("broken_agent", "experience buffer closed"))
    }
}

/// Returns an allocation with no strategies in it.
struct EmptyAgent;

#[async_trait]
impl AllocationAgent for EmptyAgent {
    fn name(&self) -> &str {
        "empty_agent"
    }

    async fn get_strategy_allocation(
        &self,
        _market_state: &MarketState,
        total_capital: f64,
    ) -> Result<StrategyAllocation> {
        Ok(StrategyAllocation::new("empty", total_capital))
    }

    async fn action_preferences(&self, _market_state: &MarketState) -> Result<BTreeMap<String, f64>> {
        Ok(BTreeMap::new())
    }
}

fn broken_manager() -> AdaptiveLearningManager {
    AdaptiveLearningManager::new(
        AdaptiveManagerConfig::default(),
        OrchestratorConfig::default(),
        Learners::none()
            .with_optimizer(Arc::new(BrokenOptimizer))
            .with_detector(Arc::new(BrokenDetector))
            .with_agent(Arc::new(BrokenAgent)),
    )
    .unwrap()
}

fn bar() -> MarketDataPoint {
    MarketDataPoint {
        timestamp: Utc::now(),
        open: 100.0,
        high: 101.0,
        low: 99.0,
        close: 100.5,
        volume: 1_000.0,
        implied_vol: Some(0.2),
    }
}

#[tokio::test]
async fn failing_optimizer_falls_back_to_safe_mode() {
    let manager = broken_manager();
    let params = manager.get_parameters("wheel", Some(&MarketState::default())).await;

    assert_eq!(params.optimization_method, METHOD_SAFE_MODE_DEFAULT);
    assert_eq!(params.get_confidence_score(), 0.3);
    assert!(params.parameters.contains_key("put_delta"));

    let entry = manager.orchestration_logs().pop().unwrap();
    let reason = entry.data["fallback_reason"].as_str().unwrap();
    assert!(reason.contains("broken_optimizer"), "got {reason}");
    assert!(reason.contains("cholesky failed"), "got {reason}");
}

/// Malformed caller bounds are rejected by the optimizer and served as safe mode.
#[tokio::test]
async fn malformed_bounds_fall_back_to_safe_mode() {
    let optimizers: [Arc<dyn ParameterOptimizer>; 2] = [
        Arc::new(HeuristicOptimizer::default()),
        Arc::new(GaussianProcessOptimizer::new(GaussianProcessConfig::default())),
    ];
    for optimizer in optimizers {
        let manager = AdaptiveLearningManager::new(
            AdaptiveManagerConfig::default(),
            OrchestratorConfig::default(),
            Learners::none().with_optimizer(optimizer.clone()),
        )
        .unwrap();
        let mut params = BTreeMap::new();
        params.insert("strike_delta".to_string(), 0.16);
        for _ in 0..6 {
            let backtest = BacktestResult::new("iron_condor", params.clone())
                .with_metrics(1.2, 0.6, 0.1, 0.04);
            manager.on_backtest_complete(&backtest).await;
        }

        for bad in [ParameterBounds::new(0.3, 0.1), ParameterBounds::new(f64::NAN, 0.3)] {
            let mut bounds = BTreeMap::new();
            bounds.insert("strike_delta".to_string(), bad);
            let served = manager
                .get_parameters_with_bounds("iron_condor", Some(&bounds), None)
                .await;

            assert_eq!(served.optimization_method, METHOD_SAFE_MODE_DEFAULT, "{}", optimizer.name());
            let entry = manager.orchestration_logs().pop().unwrap();
            let reason = entry.data["fallback_reason"].as_str().unwrap();
            assert!(reason.contains("invalid parameter bounds"), "got {reason}");
        }
    }
}

#[tokio::test]
async fn failing_agent_falls_back_to_safe_mode_allocation() {
    let manager = broken_manager();
    let allocation = manager
        .get_strategy_allocation(&MarketState::default(), 40_000.0)
        .await;

    assert_eq!(allocation.allocation_method, ALLOCATION_SAFE_MODE_ORCHESTRATOR);
    assert_eq!(allocation.confidence_score, 0.2);
    assert!(allocation.is_balanced(BALANCE_TOLERANCE));
    assert_eq!(allocation.total_capital, 40_000.0);
}

#[tokio::test]
async fn empty_agent_allocation_is_replaced() {
    let manager = AdaptiveLearningManager::new(
        AdaptiveManagerConfig::default(),
        OrchestratorConfig::default(),
        Learners::none().with_agent(Arc::new(EmptyAgent)),
    )
    .unwrap();
    let allocation = manager
        .get_strategy_allocation(&MarketState::default(), 1_000.0)
        .await;
    assert_eq!(allocation.allocation_method, ALLOCATION_SAFE_MODE_ORCHESTRATOR);
    assert!(allocation.is_balanced(BALANCE_TOLERANCE));
}

/// One failing component never stops the others from being recorded.
#[tokio::test]
async fn backtest_processing_records_each_failure() {
    let manager = broken_manager();
    let backtest = BacktestResult::new("pmcc", BTreeMap::new())
        .with_metrics(0.8, 0.55, 0.12, 0.03)
        .with_market_data(vec![bar(), bar()]);

    let summary = manager.on_backtest_complete(&backtest).await;
    for component in ["bayesian_optimizer", "anomaly_detector", "rl_agent"] {
        let update = &summary.components[component];
        assert_eq!(update.status, UpdateStatus::Failed, "{component}");
        assert!(update.detail.is_some(), "{component} should carry a reason");
    }
    let analysis = summary.anomaly_analysis.unwrap();
    assert_eq!(analysis.status, AnalysisStatus::DetectorError);
    assert_eq!(analysis.position_sizing_recommendation, 1.0);
    assert!(!manager.adaptive_manager().current_anomaly_state().is_anomalous);
    assert_eq!(manager.orchestration_log_len(), 1);
}

#[tokio::test]
async fn evaluation_collects_component_errors() {
    let manager = broken_manager();
    let report = manager
        .evaluate_market_conditions(&[bar()], Some(&MarketState::default()))
        .await;

    assert!(report.rl_preferences.is_none());
    assert!(report.errors.contains_key("rl_agent"));
    assert!(report.errors.contains_key("anomaly_detector"));
    assert_eq!(
        report.anomaly_detection.map(|a| a.status),
        Some(AnalysisStatus::DetectorError)
    );
    assert_eq!(report.position_sizing_multiplier, 1.0);
}

/// Weight validation is the one error surfaced to callers.
#[test]
fn invalid_weights_are_rejected() {
    let mut allocation = StrategyAllocation::new("test", 1_000.0);
    for weight in [-0.1, 1.5, f64::NAN] {
        let err = allocation.add_strategy("wheel", weight, None).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(matches!(err, AdaptiveError::InvalidWeight { .. }));
    }
    assert!(allocation.allocations.is_empty());
}

#[test]
fn status_without_learners_reports_everything_unavailable() {
    let manager = AdaptiveLearningManager::with_defaults().unwrap();
    let status = tokio_test::block_on(manager.get_orchestration_status());

    for component in ["bayesian_optimizer", "anomaly_detector", "rl_agent"] {
        assert!(!status.components[component].available, "{component}");
        assert!(!status.components[component].initialized, "{component}");
    }
    assert!(status.components["adaptive_manager"].available);
    assert_eq!(status.position_sizing_multiplier, 1.0);
    assert!(!status.artifacts_enabled);
    assert_eq!(status.log_entries, 0);
}

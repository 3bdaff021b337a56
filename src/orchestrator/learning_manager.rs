//! Adaptive Learning Manager
//!
//! Top-level facade over the three optional learners. Every public decision
//! returns a usable, versioned result: an absent learner and a failing learner
//! both resolve to the same safe-mode path, and the difference only shows in
//! the method tag and the audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::artifacts::ArtifactWriter;
use super::audit::{AuditLog, ComponentAvailability, OrchestrationLogEntry};
use super::reward::calculate_reward;
use super::safe_mode::{safe_mode_allocation, safe_mode_parameters};
use crate::adaptive::{AdaptiveManager, AnalysisResult, AnalysisStatus, AnomalyState};
use crate::config::{ensure_valid, AdaptiveManagerConfig, OrchestratorConfig};
use crate::domain::{
    BacktestResult, MarketDataPoint, MarketState, OptimizedStrategyParameters, ParameterBounds,
    StrategyAllocation, VersionStamp,
};
use crate::error::Result;
use crate::learners::{
    AllocationAgent, AnomalyDetector, HeuristicOptimizer, ParameterOptimizer,
    RuleBasedAllocationAgent, ZScoreDetector,
};

pub const GENERATED_BY: &str = "adaptive_learning_manager";

pub const EVENT_BACKTEST_COMPLETE: &str = "backtest_complete";
pub const EVENT_PARAMETER_REQUEST: &str = "parameter_request";
pub const EVENT_ALLOCATION_REQUEST: &str = "allocation_request";
pub const EVENT_MARKET_EVALUATION: &str = "market_evaluation";

/// Optional learners handed to the orchestrator at construction
#[derive(Default, Clone)]
pub struct Learners {
    pub optimizer: Option<Arc<dyn ParameterOptimizer>>,
    pub detector: Option<Arc<dyn AnomalyDetector>>,
    pub agent: Option<Arc<dyn AllocationAgent>>,
}

impl Learners {
    /// No learners at all; every decision runs in safe mode.
    pub fn none() -> Self {
        Self::default()
    }

    /// Rule-based variant of every capability.
    ///
    /// The z-score detector still needs calibrating before it reports anything.
    pub fn rule_based(portfolio_name: &str) -> Self {
        Self {
            optimizer: Some(Arc::new(HeuristicOptimizer::default())),
            detector: Some(Arc::new(ZScoreDetector::default())),
            agent: Some(Arc::new(RuleBasedAllocationAgent::new(portfolio_name))),
        }
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn ParameterOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn AnomalyDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn AllocationAgent>) -> Self {
        self.agent = Some(agent);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Updated,
    /// Component not registered (or not trained)
    Unavailable,
    /// Nothing to feed the component with
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub status: UpdateStatus,
    pub detail: Option<String>,
}

impl ComponentUpdate {
    fn new(status: UpdateStatus, detail: Option<String>) -> Self {
        Self { status, detail }
    }
}

/// Outcome of routing one backtest through the learners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub timestamp: DateTime<Utc>,
    pub strategy_id: String,
    pub components: BTreeMap<String, ComponentUpdate>,
    pub rl_reward: f64,
    pub anomaly_analysis: Option<AnalysisResult>,
    pub version: VersionStamp,
}

/// Best-effort market read; each section is present only if its component is
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub timestamp: DateTime<Utc>,
    pub market_state_id: Option<String>,
    pub anomaly_detection: Option<AnalysisResult>,
    pub rl_preferences: Option<BTreeMap<String, f64>>,
    /// Component name -> failure reason
    pub errors: BTreeMap<String, String>,
    pub position_sizing_multiplier: f64,
    pub version: VersionStamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub available: bool,
    pub initialized: bool,
    pub implementation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationStatus {
    pub timestamp: DateTime<Utc>,
    pub components: BTreeMap<String, ComponentStatus>,
    pub anomaly_state: AnomalyState,
    pub position_sizing_multiplier: f64,
    pub log_entries: usize,
    pub artifacts_enabled: bool,
    pub version: VersionStamp,
}

pub struct AdaptiveLearningManager {
    config: OrchestratorConfig,
    optimizer: Option<Arc<dyn ParameterOptimizer>>,
    agent: Option<Arc<dyn AllocationAgent>>,
    adaptive: Arc<AdaptiveManager>,
    version: VersionStamp,
    audit: AuditLog,
    artifacts: Option<ArtifactWriter>,
    // Serialises anomaly analysis against allocation sizing
    decision_lock: Mutex<()>,
}

impl AdaptiveLearningManager {
    /// Only configuration errors are returned; learners are not called here.
    pub fn new(
        adaptive_config: AdaptiveManagerConfig,
        config: OrchestratorConfig,
        learners: Learners,
    ) -> Result<Self> {
        ensure_valid(config.validate())?;

        let mut version = VersionStamp::new(config.code_version.clone());
        if let Some(snapshot) = &config.data_snapshot {
            version = version.with_data_snapshot(snapshot.clone());
        }
        if let Some(commit) = &config.git_commit {
            version = version.with_git_commit(commit.clone());
        }

        let adaptive = Arc::new(AdaptiveManager::new(
            adaptive_config,
            learners.detector,
            version.clone(),
        )?);

        let artifacts = match (&config.output_dir, config.persist_artifacts) {
            (Some(dir), true) => Some(ArtifactWriter::new(dir, GENERATED_BY)),
            _ => None,
        };

        info!(
            version = %version,
            optimizer = learners.optimizer.as_ref().map(|o| o.name()).unwrap_or("none"),
            detector = adaptive.detector().map(|d| d.name()).unwrap_or("none"),
            agent = learners.agent.as_ref().map(|a| a.name()).unwrap_or("none"),
            artifacts = artifacts.is_some(),
            "Adaptive learning manager initialised"
        );

        Ok(Self {
            config,
            optimizer: learners.optimizer,
            agent: learners.agent,
            adaptive,
            version,
            audit: AuditLog::new(),
            artifacts,
            decision_lock: Mutex::new(()),
        })
    }

    /// Safe mode everywhere, default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            AdaptiveManagerConfig::default(),
            OrchestratorConfig::default(),
            Learners::none(),
        )
    }

    pub fn version(&self) -> &VersionStamp {
        &self.version
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn adaptive_manager(&self) -> &Arc<AdaptiveManager> {
        &self.adaptive
    }

    fn availability(&self) -> ComponentAvailability {
        ComponentAvailability {
            bayesian_optimizer: self.optimizer.is_some(),
            anomaly_detector: self.adaptive.detector().is_some(),
            rl_agent: self.agent.is_some(),
            adaptive_manager: true,
        }
    }

    /// Feed a completed backtest to every learner.
    ///
    /// A single component failing is recorded in the summary and never aborts
    /// the others.
    pub async fn on_backtest_complete(&self, result: &BacktestResult) -> ProcessingSummary {
        let mut components = BTreeMap::new();

        let optimizer_update = match &self.optimizer {
            Some(optimizer) => match optimizer.update(result).await {
                Ok(()) => ComponentUpdate::new(UpdateStatus::Updated, None),
                Err(e) => {
                    warn!(strategy = %result.strategy_id, error = %e, "Optimizer update failed");
                    ComponentUpdate::new(UpdateStatus::Failed, Some(e.to_string()))
                }
            },
            None => ComponentUpdate::new(UpdateStatus::Unavailable, None),
        };
        components.insert("bayesian_optimizer".to_string(), optimizer_update);

        let mut anomaly_analysis = None;
        let detector_update = match result.market_data.as_deref() {
            Some(window) if !window.is_empty() => {
                let analysis = {
                    let _guard = self.decision_lock.lock().await;
                    self.adaptive
                        .analyze_market_conditions(window, result.market_state.as_ref())
                        .await
                };
                let update = match analysis.status {
                    AnalysisStatus::Analyzed => ComponentUpdate::new(
                        UpdateStatus::Updated,
                        Some(format!("anomalies_detected={}", analysis.anomalies_detected)),
                    ),
                    AnalysisStatus::Unavailable => ComponentUpdate::new(UpdateStatus::Unavailable, None),
                    AnalysisStatus::DetectorError => {
                        ComponentUpdate::new(UpdateStatus::Failed, analysis.error.clone())
                    }
                };
                anomaly_analysis = Some(analysis);
                update
            }
            _ => ComponentUpdate::new(
                UpdateStatus::Skipped,
                Some("backtest carries no market data".to_string()),
            ),
        };
        components.insert("anomaly_detector".to_string(), detector_update);

        let rl_reward = self.calculate_rl_reward(result);
        let agent_update = match &self.agent {
            Some(agent) => match agent.observe_reward(&result.strategy_id, rl_reward).await {
                Ok(()) => ComponentUpdate::new(UpdateStatus::Updated, None),
                Err(e) => {
                    warn!(strategy = %result.strategy_id, error = %e, "Agent reward update failed");
                    ComponentUpdate::new(UpdateStatus::Failed, Some(e.to_string()))
                }
            },
            None => ComponentUpdate::new(UpdateStatus::Unavailable, None),
        };
        components.insert("rl_agent".to_string(), agent_update);

        let summary = ProcessingSummary {
            timestamp: Utc::now(),
            strategy_id: result.strategy_id.clone(),
            components,
            rl_reward,
            anomaly_analysis,
            version: self.version.clone(),
        };

        debug!(strategy = %summary.strategy_id, reward = rl_reward, "Backtest processed");
        self.log_orchestration_event(
            EVENT_BACKTEST_COMPLETE,
            serde_json::to_value(&summary).unwrap_or_default(),
        );
        summary
    }

    pub async fn get_parameters(
        &self,
        strategy_id: &str,
        market_state: Option<&MarketState>,
    ) -> OptimizedStrategyParameters {
        self.get_parameters_with_bounds(strategy_id, None, market_state)
            .await
    }

    /// Optimizer suggestion, or the safe-mode set when it is absent or fails.
    pub async fn get_parameters_with_bounds(
        &self,
        strategy_id: &str,
        parameter_bounds: Option<&BTreeMap<String, ParameterBounds>>,
        market_state: Option<&MarketState>,
    ) -> OptimizedStrategyParameters {
        let (params, fallback_reason) = match &self.optimizer {
            Some(optimizer) => {
                match optimizer
                    .suggest_parameters(strategy_id, parameter_bounds, market_state)
                    .await
                {
                    Ok(params) => (
                        params
                            .for_market_state(market_state)
                            .with_version(self.version.clone()),
                        None,
                    ),
                    Err(e) => {
                        warn!(
                            strategy = strategy_id,
                            optimizer = optimizer.name(),
                            error = %e,
                            "Parameter optimization failed, using safe mode"
                        );
                        (
                            safe_mode_parameters(strategy_id, market_state, &self.version),
                            Some(format!("{} failed: {e}", optimizer.name())),
                        )
                    }
                }
            }
            None => (
                safe_mode_parameters(strategy_id, market_state, &self.version),
                Some("no parameter optimizer registered".to_string()),
            ),
        };

        info!(
            strategy = strategy_id,
            method = %params.optimization_method,
            confidence = params.get_confidence_score(),
            "Parameters served"
        );
        self.log_orchestration_event(
            EVENT_PARAMETER_REQUEST,
            json!({
                "strategy_id": strategy_id,
                "optimization_id": params.optimization_id,
                "optimization_method": params.optimization_method,
                "confidence_score": params.get_confidence_score(),
                "parameters": params.parameters,
                "market_state_id": params.market_state_id,
                "fallback_reason": fallback_reason,
            }),
        );
        self.persist(strategy_id, "parameters", &params.optimization_id, &params)
            .await;
        params
    }

    /// Allocation from the agent (or safe mode), scaled down while an anomaly is active.
    pub async fn get_strategy_allocation(
        &self,
        market_state: &MarketState,
        total_capital: f64,
    ) -> StrategyAllocation {
        let _guard = self.decision_lock.lock().await;

        let (mut allocation, fallback_reason) = match &self.agent {
            Some(agent) => match agent.get_strategy_allocation(market_state, total_capital).await {
                Ok(allocation) if !allocation.allocations.is_empty() => (allocation, None),
                Ok(_) => {
                    warn!(agent = agent.name(), "Agent returned an empty allocation, using safe mode");
                    (
                        self.safe_mode_allocation(market_state, total_capital),
                        Some(format!("{} returned an empty allocation", agent.name())),
                    )
                }
                Err(e) => {
                    warn!(agent = agent.name(), error = %e, "Allocation agent failed, using safe mode");
                    (
                        self.safe_mode_allocation(market_state, total_capital),
                        Some(format!("{} failed: {e}", agent.name())),
                    )
                }
            },
            None => (
                self.safe_mode_allocation(market_state, total_capital),
                Some("no allocation agent registered".to_string()),
            ),
        };

        allocation.market_state_id = Some(market_state.state_id.clone());
        allocation.set_total_capital(total_capital);
        allocation.original_capital = total_capital;

        let anomaly = self.adaptive.current_anomaly_state();
        if anomaly.is_anomalous {
            let factor = self.adaptive.reduction_factor();
            allocation.anomaly_adjustment = factor;
            allocation.set_total_capital(total_capital * factor);
            warn!(
                severity = %anomaly.severity,
                factor,
                original_capital = total_capital,
                adjusted_capital = allocation.total_capital,
                "Allocation capital reduced for active anomaly"
            );
        } else {
            allocation.anomaly_adjustment = 1.0;
        }
        let allocation = allocation.with_version(self.version.clone());

        info!(
            method = %allocation.allocation_method,
            strategies = allocation.allocations.len(),
            capital = allocation.total_capital,
            "Allocation served"
        );
        self.log_orchestration_event(
            EVENT_ALLOCATION_REQUEST,
            json!({
                "allocation_id": allocation.allocation_id,
                "allocation_method": allocation.allocation_method,
                "confidence_score": allocation.confidence_score,
                "allocations": allocation.allocations,
                "total_capital": allocation.total_capital,
                "original_capital": allocation.original_capital,
                "anomaly_adjustment": allocation.anomaly_adjustment,
                "anomaly_severity": anomaly.severity,
                "market_state_id": allocation.market_state_id,
                "fallback_reason": fallback_reason,
            }),
        );
        self.persist(
            &allocation.portfolio_name,
            "allocation",
            &allocation.allocation_id,
            &allocation,
        )
        .await;
        allocation
    }

    fn safe_mode_allocation(&self, market_state: &MarketState, total_capital: f64) -> StrategyAllocation {
        safe_mode_allocation(
            &self.config.portfolio_name,
            &self.config.safe_mode_strategies,
            market_state,
            total_capital,
            &self.version,
        )
    }

    /// Aggregate whatever the available components can say about the market.
    pub async fn evaluate_market_conditions(
        &self,
        market_data: &[MarketDataPoint],
        market_state: Option<&MarketState>,
    ) -> EvaluationReport {
        let mut errors = BTreeMap::new();

        let anomaly_detection = if self.adaptive.has_trained_detector() {
            let analysis = {
                let _guard = self.decision_lock.lock().await;
                self.adaptive
                    .analyze_market_conditions(market_data, market_state)
                    .await
            };
            if let Some(reason) = &analysis.error {
                errors.insert("anomaly_detector".to_string(), reason.clone());
            }
            Some(analysis)
        } else {
            None
        };

        let rl_preferences = match (&self.agent, market_state) {
            (Some(agent), Some(state)) => match agent.action_preferences(state).await {
                Ok(preferences) => Some(preferences),
                Err(e) => {
                    warn!(agent = agent.name(), error = %e, "Action preferences unavailable");
                    errors.insert("rl_agent".to_string(), e.to_string());
                    None
                }
            },
            _ => None,
        };

        let report = EvaluationReport {
            timestamp: Utc::now(),
            market_state_id: market_state.map(|s| s.state_id.clone()),
            anomaly_detection,
            rl_preferences,
            errors,
            position_sizing_multiplier: self.adaptive.get_position_sizing_multiplier(),
            version: self.version.clone(),
        };

        self.log_orchestration_event(
            EVENT_MARKET_EVALUATION,
            serde_json::to_value(&report).unwrap_or_default(),
        );
        report
    }

    pub fn calculate_rl_reward(&self, result: &BacktestResult) -> f64 {
        calculate_reward(result)
    }

    /// Read-only; does not add an audit entry.
    pub async fn get_orchestration_status(&self) -> OrchestrationStatus {
        let mut components = BTreeMap::new();

        let optimizer_initialized = match &self.optimizer {
            Some(optimizer) => {
                let mut any = false;
                for strategy in &self.config.safe_mode_strategies {
                    if optimizer.sample_count(strategy).await > 0 {
                        any = true;
                        break;
                    }
                }
                any
            }
            None => false,
        };
        components.insert(
            "bayesian_optimizer".to_string(),
            ComponentStatus {
                available: self.optimizer.is_some(),
                initialized: optimizer_initialized,
                implementation: self.optimizer.as_ref().map(|o| o.name().to_string()),
            },
        );
        components.insert(
            "anomaly_detector".to_string(),
            ComponentStatus {
                available: self.adaptive.detector().is_some(),
                initialized: self.adaptive.has_trained_detector(),
                implementation: self.adaptive.detector().map(|d| d.name().to_string()),
            },
        );
        components.insert(
            "rl_agent".to_string(),
            ComponentStatus {
                available: self.agent.is_some(),
                initialized: self.agent.is_some(),
                implementation: self.agent.as_ref().map(|a| a.name().to_string()),
            },
        );
        components.insert(
            "adaptive_manager".to_string(),
            ComponentStatus {
                available: true,
                initialized: true,
                implementation: Some("adaptive_manager".to_string()),
            },
        );

        OrchestrationStatus {
            timestamp: Utc::now(),
            components,
            anomaly_state: self.adaptive.current_anomaly_state(),
            position_sizing_multiplier: self.adaptive.get_position_sizing_multiplier(),
            log_entries: self.audit.len(),
            artifacts_enabled: self.artifacts.is_some(),
            version: self.version.clone(),
        }
    }

    /// Append one structured entry to the audit log.
    pub fn log_orchestration_event(&self, event_type: &str, data: serde_json::Value) {
        self.audit.push(OrchestrationLogEntry {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            data,
            version: self.version.clone(),
            components: self.availability(),
        });
    }

    pub fn orchestration_logs(&self) -> Vec<OrchestrationLogEntry> {
        self.audit.snapshot()
    }

    pub fn orchestration_log_len(&self) -> usize {
        self.audit.len()
    }

    pub fn clear_orchestration_logs(&self) {
        self.audit.clear();
    }

    pub fn export_orchestration_logs(&self) -> Result<serde_json::Value> {
        Ok(self.audit.export_json()?)
    }

    /// Write a decision artifact if persistence is on. Failures are only logged.
    async fn persist<T: Serialize>(&self, scope: &str, kind: &str, id: &str, payload: &T) {
        let Some(writer) = &self.artifacts else {
            return;
        };
        let explainability = json!({
            "orchestration": self.audit.latest(),
            "anomaly": self.adaptive.latest_explainability_entry(),
        });
        if let Err(e) = writer
            .write(scope, kind, id, payload, &self.version, &explainability)
            .await
        {
            warn!(kind, id, error = %e, "Failed to persist artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ALLOCATION_RULE_BASED, ALLOCATION_SAFE_MODE_ORCHESTRATOR, BALANCE_TOLERANCE,
        METHOD_SAFE_MODE_DEFAULT,
    };
    use crate::learners::anomaly::tests::{calm_window, crash_bar};
    use crate::learners::AnomalySeverity;

    fn backtest(strategy: &str) -> BacktestResult {
        let mut params = BTreeMap::new();
        params.insert("put_delta".to_string(), 0.3);
        BacktestResult::new(strategy, params).with_metrics(1.2, 0.65, 0.08, 0.06)
    }

    #[tokio::test]
    async fn test_safe_mode_end_to_end() {
        let alm = AdaptiveLearningManager::with_defaults().unwrap();
        let state = MarketState::default();

        let params = alm.get_parameters("iron_condor", Some(&state)).await;
        assert_eq!(params.optimization_method, METHOD_SAFE_MODE_DEFAULT);
        assert_eq!(params.get_confidence_score(), 0.3);
        assert!(params.parameters.contains_key("strike_delta"));
        assert!(params.parameters.contains_key("days_to_expiry"));

        let allocation = alm.get_strategy_allocation(&state, 75_000.0).await;
        assert_eq!(allocation.allocation_method, ALLOCATION_SAFE_MODE_ORCHESTRATOR);
        assert_eq!(allocation.confidence_score, 0.2);
        assert!(allocation.is_balanced(BALANCE_TOLERANCE));
        assert_eq!(allocation.total_capital, 75_000.0);
        assert_eq!(allocation.anomaly_adjustment, 1.0);
        assert_eq!(allocation.original_capital, 75_000.0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = OrchestratorConfig {
            safe_mode_strategies: Vec::new(),
            ..Default::default()
        };
        assert!(AdaptiveLearningManager::new(
            AdaptiveManagerConfig::default(),
            config,
            Learners::none()
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_backtest_without_market_data_skips_detector() {
        let alm = AdaptiveLearningManager::new(
            AdaptiveManagerConfig::default(),
            OrchestratorConfig::default(),
            Learners::rule_based("adaptive_options"),
        )
        .unwrap();

        let summary = alm.on_backtest_complete(&backtest("wheel")).await;
        assert_eq!(summary.components["bayesian_optimizer"].status, UpdateStatus::Updated);
        assert_eq!(summary.components["anomaly_detector"].status, UpdateStatus::Skipped);
        assert_eq!(summary.components["rl_agent"].status, UpdateStatus::Updated);
        assert!(summary.rl_reward > 0.0);
        assert!(summary.anomaly_analysis.is_none());
        assert_eq!(alm.orchestration_log_len(), 1);
    }

    #[tokio::test]
    async fn test_backtest_market_data_drives_anomaly_scaling() {
        let detector = ZScoreDetector::default();
        detector.train(&calm_window(40)).await.unwrap();
        let alm = AdaptiveLearningManager::new(
            AdaptiveManagerConfig::default(),
            OrchestratorConfig::default(),
            Learners::rule_based("adaptive_options").with_detector(Arc::new(detector)),
        )
        .unwrap();

        let mut window = calm_window(10);
        window.push(crash_bar());
        let summary = alm
            .on_backtest_complete(&backtest("iron_condor").with_market_data(window))
            .await;
        assert_eq!(summary.components["anomaly_detector"].status, UpdateStatus::Updated);
        assert!(summary.anomaly_analysis.unwrap().anomalies_detected);

        let allocation = alm
            .get_strategy_allocation(&MarketState::default(), 100_000.0)
            .await;
        assert_eq!(allocation.allocation_method, ALLOCATION_RULE_BASED);
        assert_eq!(allocation.total_capital, 50_000.0);
        assert_eq!(allocation.anomaly_adjustment, 0.5);
        assert_eq!(allocation.original_capital, 100_000.0);
        assert!((allocation.capital_for("iron_condor") - 20_000.0).abs() < 1e-6);

        let status = alm.get_orchestration_status().await;
        assert!(status.anomaly_state.is_anomalous);
        assert_eq!(status.anomaly_state.severity, AnomalySeverity::Critical);
        assert_eq!(status.position_sizing_multiplier, 0.5);
    }

    #[tokio::test]
    async fn test_evaluation_degrades_per_component() {
        let alm = AdaptiveLearningManager::with_defaults().unwrap();
        let report = alm
            .evaluate_market_conditions(&calm_window(5), Some(&MarketState::default()))
            .await;
        assert!(report.anomaly_detection.is_none());
        assert!(report.rl_preferences.is_none());
        assert!(report.errors.is_empty());
        assert_eq!(report.position_sizing_multiplier, 1.0);

        let alm = AdaptiveLearningManager::new(
            AdaptiveManagerConfig::default(),
            OrchestratorConfig::default(),
            Learners::rule_based("adaptive_options"),
        )
        .unwrap();
        let report = alm
            .evaluate_market_conditions(&calm_window(5), Some(&MarketState::default()))
            .await;
        // Detector registered but never calibrated
        assert!(report.anomaly_detection.is_none());
        let preferences = report.rl_preferences.unwrap();
        assert!((preferences.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_status_reports_components() {
        let alm = AdaptiveLearningManager::with_defaults().unwrap();
        let status = alm.get_orchestration_status().await;
        assert_eq!(status.components.len(), 4);
        assert!(!status.components["bayesian_optimizer"].available);
        assert!(!status.components["anomaly_detector"].available);
        assert!(!status.components["rl_agent"].available);
        assert!(status.components["adaptive_manager"].available);
        assert!(!status.artifacts_enabled);
        assert_eq!(alm.orchestration_log_len(), 0);
    }

    #[tokio::test]
    async fn test_artifacts_written_when_enabled() {
        let root = std::env::temp_dir().join(format!("adaptive_options_alm_{}", uuid::Uuid::new_v4()));
        let config = OrchestratorConfig {
            output_dir: Some(root.clone()),
            persist_artifacts: true,
            data_snapshot: Some("snap-42".to_string()),
            ..Default::default()
        };
        let alm = AdaptiveLearningManager::new(
            AdaptiveManagerConfig::default(),
            config,
            Learners::none(),
        )
        .unwrap();

        let params = alm.get_parameters("wheel", None).await;
        let path = root
            .join("wheel")
            .join(format!("parameters_{}.json", params.optimization_id));
        let written: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written["generated_by"], GENERATED_BY);
        assert_eq!(written["data_snapshot"], "snap-42");
        assert_eq!(written["payload"]["optimization_method"], METHOD_SAFE_MODE_DEFAULT);
        assert_eq!(
            written["explainability"]["orchestration"]["event_type"],
            EVENT_PARAMETER_REQUEST
        );

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}

//! Adaptive Manager
//!
//! Single source of truth for the anomaly state and the resulting position
//! sizing multiplier. Cooldown expiry is evaluated lazily whenever the state,
//! the multiplier or the status is queried; there is no background timer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

use super::hooks::{PositionSizer, PositionSizingHook, SizingContext};
use super::state::AnomalyState;
use crate::config::{ensure_valid, AdaptiveManagerConfig};
use crate::domain::{MarketDataPoint, MarketState, VersionStamp};
use crate::error::Result;
use crate::learners::{AnomalyDetector, AnomalyRationale, AnomalySeverity};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    Elevated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// No detector registered, or it is not trained
    Unavailable,
    Analyzed,
    /// The detector returned an error; state left untouched
    DetectorError,
}

/// Outcome of one `analyze_market_conditions` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub timestamp: DateTime<Utc>,
    pub status: AnalysisStatus,
    pub detector: Option<String>,
    pub market_state_id: Option<String>,
    pub anomalies_detected: bool,
    pub num_anomalies: usize,
    pub max_anomaly_score: f64,
    pub anomaly_threshold: f64,
    pub severity: AnomalySeverity,
    pub position_sizing_recommendation: f64,
    pub risk_level: RiskLevel,
    pub rationale: Option<AnomalyRationale>,
    pub error: Option<String>,
}

impl AnalysisResult {
    fn unavailable(now: DateTime<Utc>, detector: Option<String>, market_state: Option<&MarketState>) -> Self {
        Self {
            timestamp: now,
            status: AnalysisStatus::Unavailable,
            detector,
            market_state_id: market_state.map(|s| s.state_id.clone()),
            anomalies_detected: false,
            num_anomalies: 0,
            max_anomaly_score: 0.0,
            anomaly_threshold: 0.0,
            severity: AnomalySeverity::None,
            position_sizing_recommendation: 1.0,
            risk_level: RiskLevel::Normal,
            rationale: None,
            error: None,
        }
    }
}

/// Explainability log record for one analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainabilityEntry {
    pub timestamp: DateTime<Utc>,
    pub analysis: AnalysisResult,
    pub config: AdaptiveManagerConfig,
    pub version: VersionStamp,
}

/// Read-only snapshot for dashboards and the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub detector_available: bool,
    pub detector_trained: bool,
    pub detector_name: Option<String>,
    pub anomaly_state: AnomalyState,
    pub cooldown_remaining_secs: Option<i64>,
    pub hook_count: usize,
    pub log_entries: usize,
    pub position_sizing_reduction_factor: f64,
}

pub struct AdaptiveManager {
    config: AdaptiveManagerConfig,
    detector: Option<Arc<dyn AnomalyDetector>>,
    version: VersionStamp,
    state: Mutex<AnomalyState>,
    hooks: RwLock<Vec<PositionSizingHook>>,
    log: Mutex<Vec<ExplainabilityEntry>>,
}

impl AdaptiveManager {
    /// Rejects an invalid configuration with `AdaptiveError::Validation`.
    pub fn new(
        config: AdaptiveManagerConfig,
        detector: Option<Arc<dyn AnomalyDetector>>,
        version: VersionStamp,
    ) -> Result<Self> {
        ensure_valid(config.validate())?;
        Ok(Self {
            config,
            detector,
            version,
            state: Mutex::new(AnomalyState::default()),
            hooks: RwLock::new(Vec::new()),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &AdaptiveManagerConfig {
        &self.config
    }

    pub fn reduction_factor(&self) -> f64 {
        self.config.position_sizing_reduction_factor
    }

    pub fn detector(&self) -> Option<&Arc<dyn AnomalyDetector>> {
        self.detector.as_ref()
    }

    pub fn has_trained_detector(&self) -> bool {
        self.detector.as_ref().map(|d| d.is_trained()).unwrap_or(false)
    }

    fn cooldown(&self) -> Duration {
        Duration::minutes(self.config.anomaly_cooldown_minutes)
    }

    /// Reset an expired anomaly in place.
    fn expire_cooldown(&self, state: &mut AnomalyState, now: DateTime<Utc>) {
        if state.cooldown_elapsed(now, self.cooldown()) {
            info!(
                severity = %state.severity,
                cooldown_minutes = self.config.anomaly_cooldown_minutes,
                "Anomaly cooldown elapsed, returning to normal sizing"
            );
            *state = AnomalyState::default();
        }
    }

    /// Run the detector over `market_data` and update the anomaly state.
    ///
    /// A missing or untrained detector is not an error: the result is marked
    /// unavailable with a neutral recommendation.
    pub async fn analyze_market_conditions(
        &self,
        market_data: &[MarketDataPoint],
        market_state: Option<&MarketState>,
    ) -> AnalysisResult {
        let now = Utc::now();
        let detector_name = self.detector.as_ref().map(|d| d.name().to_string());

        let result = match &self.detector {
            Some(detector) if detector.is_trained() => {
                match detector.detect(market_data, market_state).await {
                    Ok(report) => {
                        let mut state = lock(&self.state);
                        if report.anomalies_detected {
                            *state = AnomalyState::from_detection(&report, now);
                            warn!(
                                severity = %state.severity,
                                score = report.max_anomaly_score,
                                threshold = report.anomaly_threshold,
                                "Market anomaly detected, reducing position sizes"
                            );
                        } else {
                            self.expire_cooldown(&mut state, now);
                        }

                        let (recommendation, risk_level) = if state.is_anomalous {
                            (self.reduction_factor(), RiskLevel::Elevated)
                        } else {
                            (1.0, RiskLevel::Normal)
                        };
                        AnalysisResult {
                            timestamp: now,
                            status: AnalysisStatus::Analyzed,
                            detector: detector_name,
                            market_state_id: market_state.map(|s| s.state_id.clone()),
                            anomalies_detected: report.anomalies_detected,
                            num_anomalies: report.num_anomalies,
                            max_anomaly_score: report.max_anomaly_score,
                            anomaly_threshold: report.anomaly_threshold,
                            severity: if report.anomalies_detected {
                                state.severity
                            } else {
                                AnomalySeverity::None
                            },
                            position_sizing_recommendation: recommendation,
                            risk_level,
                            rationale: Some(report.rationale),
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Anomaly detector failed, anomaly state unchanged");
                        let mut result = AnalysisResult::unavailable(now, detector_name, market_state);
                        result.status = AnalysisStatus::DetectorError;
                        result.error = Some(e.to_string());
                        result
                    }
                }
            }
            _ => {
                debug!("Anomaly detection unavailable");
                AnalysisResult::unavailable(now, detector_name, market_state)
            }
        };

        self.push_log(ExplainabilityEntry {
            timestamp: now,
            analysis: result.clone(),
            config: self.config.clone(),
            version: self.version.clone(),
        });
        result
    }

    fn push_log(&self, entry: ExplainabilityEntry) {
        let mut log = lock(&self.log);
        log.push(entry);
        if log.len() > self.config.max_log_entries {
            let excess = log.len() - self.config.max_log_entries;
            log.drain(..excess);
        }
    }

    /// Anomaly state after applying any elapsed cooldown.
    pub fn current_anomaly_state(&self) -> AnomalyState {
        let mut state = lock(&self.state);
        self.expire_cooldown(&mut state, Utc::now());
        state.clone()
    }

    /// Replace the anomaly state wholesale.
    ///
    /// Test seam for backdating a detection so cooldown expiry can be exercised;
    /// production code reaches Anomalous only through `analyze_market_conditions`.
    #[doc(hidden)]
    pub fn restore_anomaly_state(&self, restored: AnomalyState) {
        *lock(&self.state) = restored;
    }

    /// Manual override: back to normal regardless of cooldown.
    pub fn reset_anomaly_state(&self) {
        *lock(&self.state) = AnomalyState::default();
        info!("Anomaly state manually reset");
    }

    /// Multiplier before hooks: the reduction factor while anomalous, else 1.0.
    pub fn base_multiplier(&self) -> f64 {
        if self.current_anomaly_state().is_anomalous {
            self.reduction_factor()
        } else {
            1.0
        }
    }

    pub fn get_position_sizing_multiplier(&self) -> f64 {
        self.position_sizing_multiplier_with(&SizingContext::default())
    }

    /// Fold the base multiplier through every registered hook, in order.
    pub fn position_sizing_multiplier_with(&self, context: &SizingContext) -> f64 {
        let base = self.base_multiplier();
        // Snapshot so hooks may register further hooks without deadlocking
        let hooks: Vec<PositionSizingHook> = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        hooks.iter().enumerate().fold(base, |multiplier, (idx, hook)| {
            match hook(multiplier, context) {
                Ok(next) if next.is_finite() && next >= 0.0 => next,
                Ok(next) => {
                    warn!(hook = idx, value = next, "Position sizing hook returned invalid multiplier, skipped");
                    multiplier
                }
                Err(e) => {
                    warn!(hook = idx, error = %e, "Position sizing hook failed, skipped");
                    multiplier
                }
            }
        })
    }

    pub fn register_position_sizing_hook(&self, hook: PositionSizingHook) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Replace the whole hook list (the only removal mechanism).
    pub fn replace_position_sizing_hooks(&self, hooks: Vec<PositionSizingHook>) {
        *self.hooks.write().unwrap_or_else(PoisonError::into_inner) = hooks;
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sizer for an external position sizing system: `base_size * multiplier`.
    pub fn create_position_sizer_hook(self: &Arc<Self>) -> PositionSizer {
        let manager = Arc::clone(self);
        Arc::new(move |base_size: f64, context: &SizingContext| {
            base_size * manager.position_sizing_multiplier_with(context)
        })
    }

    pub fn get_status(&self) -> ManagerStatus {
        let now = Utc::now();
        let anomaly_state = {
            let mut state = lock(&self.state);
            self.expire_cooldown(&mut state, now);
            state.clone()
        };
        let cooldown_remaining_secs = anomaly_state
            .cooldown_remaining(now, self.cooldown())
            .map(|d| d.num_seconds());

        ManagerStatus {
            detector_available: self.detector.is_some(),
            detector_trained: self.has_trained_detector(),
            detector_name: self.detector.as_ref().map(|d| d.name().to_string()),
            anomaly_state,
            cooldown_remaining_secs,
            hook_count: self.hook_count(),
            log_entries: lock(&self.log).len(),
            position_sizing_reduction_factor: self.reduction_factor(),
        }
    }

    pub fn explainability_log(&self) -> Vec<ExplainabilityEntry> {
        lock(&self.log).clone()
    }

    pub fn latest_explainability_entry(&self) -> Option<ExplainabilityEntry> {
        lock(&self.log).last().cloned()
    }

    pub fn clear_explainability_log(&self) {
        lock(&self.log).clear();
    }
}

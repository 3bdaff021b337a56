use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::learners::{AnomalyRationale, AnomalySeverity, DetectionReport};

/// Current anomaly posture.
///
/// Normal -> Anomalous on a positive detection; Anomalous -> Normal only when
/// the cooldown has elapsed or on manual reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyState {
    pub is_anomalous: bool,
    pub anomaly_score: f64,
    pub detected_at: Option<DateTime<Utc>>,
    pub severity: AnomalySeverity,
    pub rationale: AnomalyRationale,
}

impl AnomalyState {
    pub fn from_detection(report: &DetectionReport, detected_at: DateTime<Utc>) -> Self {
        let severity = match report.rationale.severity_assessment {
            // A positive verdict without a usable grade
            AnomalySeverity::None => AnomalySeverity::Medium,
            s => s,
        };
        Self {
            is_anomalous: true,
            anomaly_score: report.max_anomaly_score,
            detected_at: Some(detected_at),
            severity,
            rationale: report.rationale.clone(),
        }
    }

    /// True once `now - detected_at` is strictly greater than the cooldown.
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match (self.is_anomalous, self.detected_at) {
            (true, Some(at)) => now - at > cooldown,
            // Anomalous without a detection time cannot age out on its own
            _ => false,
        }
    }

    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        match (self.is_anomalous, self.detected_at) {
            (true, Some(at)) => {
                let remaining = cooldown - (now - at);
                Some(remaining.max(Duration::zero()))
            }
            _ => None,
        }
    }
}

//! Anomaly detectors over windows of market bars.
//!
//! Both variants score every bar in the window and flag the window when any
//! score exceeds the calibrated threshold. Severity comes from how far the
//! worst score overshoots the threshold.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::stats::{mean_std, percentile};
use super::AnomalyDetector;
use crate::domain::{MarketDataPoint, MarketRegime, MarketState};
use crate::error::{AdaptiveError, Result};
use crate::ml::DenseNetwork;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    /// Grade by `score / threshold`.
    pub fn from_ratio(ratio: f64) -> Self {
        if !ratio.is_finite() || ratio >= 3.0 {
            Self::Critical
        } else if ratio >= 2.0 {
            Self::High
        } else if ratio >= 1.5 {
            Self::Medium
        } else if ratio > 1.0 {
            Self::Low
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySeverity::None => "none",
            AnomalySeverity::Low => "low",
            AnomalySeverity::Medium => "medium",
            AnomalySeverity::High => "high",
            AnomalySeverity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AnomalySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-inspectable explanation of a detection verdict
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyRationale {
    pub severity_assessment: AnomalySeverity,
    pub summary: String,
    /// Indices into the analysed window
    pub anomalous_points: Vec<usize>,
    /// Share of the worst point's score attributable to each feature
    pub feature_contributions: BTreeMap<String, f64>,
    pub regime: Option<MarketRegime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub detector: String,
    pub anomalies_detected: bool,
    pub num_anomalies: usize,
    pub max_anomaly_score: f64,
    pub anomaly_threshold: f64,
    pub scores: Vec<f64>,
    pub rationale: AnomalyRationale,
}

impl DetectionReport {
    fn build(
        detector: &str,
        scores: Vec<f64>,
        threshold: f64,
        contributions: BTreeMap<String, f64>,
        market_state: Option<&MarketState>,
    ) -> Self {
        let anomalous_points: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| **s > threshold)
            .map(|(i, _)| i)
            .collect();
        let max_score = scores.iter().copied().fold(0.0_f64, f64::max);
        let severity = if anomalous_points.is_empty() {
            AnomalySeverity::None
        } else if threshold > 0.0 {
            AnomalySeverity::from_ratio(max_score / threshold).max(AnomalySeverity::Low)
        } else {
            AnomalySeverity::Critical
        };

        let summary = if anomalous_points.is_empty() {
            format!(
                "{} bars within threshold {:.4} (max score {:.4})",
                scores.len(),
                threshold,
                max_score
            )
        } else {
            format!(
                "{}/{} bars above threshold {:.4}, max score {:.4}",
                anomalous_points.len(),
                scores.len(),
                threshold,
                max_score
            )
        };

        Self {
            detector: detector.to_string(),
            anomalies_detected: !anomalous_points.is_empty(),
            num_anomalies: anomalous_points.len(),
            max_anomaly_score: max_score,
            anomaly_threshold: threshold,
            scores,
            rationale: AnomalyRationale {
                severity_assessment: severity,
                summary,
                anomalous_points,
                feature_contributions: contributions,
                regime: market_state.map(|s| s.regime),
            },
        }
    }
}

fn contributions(parts: &[f64]) -> BTreeMap<String, f64> {
    let total: f64 = parts.iter().sum();
    MarketDataPoint::FEATURE_NAMES
        .iter()
        .zip(parts)
        .map(|(name, p)| {
            let share = if total > 0.0 { p / total } else { 0.0 };
            (name.to_string(), share)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct AutoencoderDetectorConfig {
    /// Percentile of training reconstruction errors used as the threshold
    pub threshold_percentile: f64,
    pub min_training_points: usize,
}

impl Default for AutoencoderDetectorConfig {
    fn default() -> Self {
        Self {
            threshold_percentile: 95.0,
            min_training_points: 20,
        }
    }
}

/// Reconstruction-error detector over a dense autoencoder
pub struct AutoencoderDetector {
    config: AutoencoderDetectorConfig,
    model: DenseNetwork,
    threshold: RwLock<Option<f64>>,
    trained: AtomicBool,
}

impl AutoencoderDetector {
    /// The model must map `MarketDataPoint::FEATURE_DIM` inputs back onto themselves.
    pub fn new(model: DenseNetwork, config: AutoencoderDetectorConfig) -> Result<Self> {
        model.validate().map_err(AdaptiveError::Validation)?;
        if model.input_dim != MarketDataPoint::FEATURE_DIM
            || model.output_dim() != MarketDataPoint::FEATURE_DIM
        {
            return Err(AdaptiveError::Validation(format!(
                "autoencoder must be {dim} -> {dim}, got {} -> {}",
                model.input_dim,
                model.output_dim(),
                dim = MarketDataPoint::FEATURE_DIM
            )));
        }
        Ok(Self {
            config,
            model,
            threshold: RwLock::new(None),
            trained: AtomicBool::new(false),
        })
    }

    /// Detector with a threshold calibrated offline.
    pub fn with_threshold(model: DenseNetwork, threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(AdaptiveError::Validation(format!(
                "anomaly threshold must be positive, got {threshold}"
            )));
        }
        let mut detector = Self::new(model, AutoencoderDetectorConfig::default())?;
        detector.threshold = RwLock::new(Some(threshold));
        detector.trained = AtomicBool::new(true);
        Ok(detector)
    }

    pub fn model(&self) -> &DenseNetwork {
        &self.model
    }

    fn score(&self, point: &MarketDataPoint) -> Result<(f64, [f64; MarketDataPoint::FEATURE_DIM])> {
        let input = point.features();
        let output = self.model.forward(&input)?;
        let mut parts = [0.0; MarketDataPoint::FEATURE_DIM];
        for (i, (a, b)) in input.iter().zip(&output).enumerate() {
            parts[i] = (a - b).powi(2);
        }
        Ok((parts.iter().sum::<f64>() / parts.len() as f64, parts))
    }
}

#[async_trait]
impl AnomalyDetector for AutoencoderDetector {
    fn name(&self) -> &str {
        "autoencoder_detector"
    }

    fn is_trained(&self) -> bool {
        self.trained.load(Ordering::SeqCst)
    }

    async fn train(&self, history: &[MarketDataPoint]) -> Result<()> {
        if history.len() < self.config.min_training_points {
            return Err(AdaptiveError::InsufficientData(format!(
                "{} calibration bars < {} required",
                history.len(),
                self.config.min_training_points
            )));
        }
        let errors = history
            .iter()
            .map(|p| self.score(p).map(|(e, _)| e))
            .collect::<Result<Vec<f64>>>()?;
        let threshold = percentile(&errors, self.config.threshold_percentile)
            .ok_or_else(|| AdaptiveError::InsufficientData("no finite reconstruction errors".to_string()))?
            .max(1e-12);

        *self.threshold.write().await = Some(threshold);
        self.trained.store(true, Ordering::SeqCst);
        info!(
            threshold,
            points = history.len(),
            "Autoencoder detector calibrated"
        );
        Ok(())
    }

    async fn detect(
        &self,
        market_data: &[MarketDataPoint],
        market_state: Option<&MarketState>,
    ) -> Result<DetectionReport> {
        let threshold = self
            .threshold
            .read()
            .await
            .ok_or_else(|| AdaptiveError::ModelUnavailable("autoencoder not calibrated".to_string()))?;
        if market_data.is_empty() {
            return Err(AdaptiveError::InsufficientData("empty market window".to_string()));
        }

        let mut scores = Vec::with_capacity(market_data.len());
        let mut worst = (f64::NEG_INFINITY, [0.0; MarketDataPoint::FEATURE_DIM]);
        for point in market_data {
            let (score, parts) = self.score(point)?;
            if score > worst.0 {
                worst = (score, parts);
            }
            scores.push(score);
        }

        let report = DetectionReport::build(
            self.name(),
            scores,
            threshold,
            contributions(&worst.1),
            market_state,
        );
        debug!(
            anomalies = report.num_anomalies,
            max_score = report.max_anomaly_score,
            "Autoencoder detection complete"
        );
        Ok(report)
    }
}

#[derive(Debug, Clone, Default)]
struct FeatureStats {
    mean: [f64; MarketDataPoint::FEATURE_DIM],
    std: [f64; MarketDataPoint::FEATURE_DIM],
}

/// Rule-based detector: per-feature z-scores against a calibration window
pub struct ZScoreDetector {
    z_threshold: f64,
    min_training_points: usize,
    stats: RwLock<Option<FeatureStats>>,
    trained: AtomicBool,
}

impl ZScoreDetector {
    pub fn new(z_threshold: f64, min_training_points: usize) -> Self {
        Self {
            z_threshold,
            min_training_points: min_training_points.max(2),
            stats: RwLock::new(None),
            trained: AtomicBool::new(false),
        }
    }
}

impl Default for ZScoreDetector {
    fn default() -> Self {
        Self::new(3.0, 20)
    }
}

#[async_trait]
impl AnomalyDetector for ZScoreDetector {
    fn name(&self) -> &str {
        "zscore_detector"
    }

    fn is_trained(&self) -> bool {
        self.trained.load(Ordering::SeqCst)
    }

    async fn train(&self, history: &[MarketDataPoint]) -> Result<()> {
        if history.len() < self.min_training_points {
            return Err(AdaptiveError::InsufficientData(format!(
                "{} calibration bars < {} required",
                history.len(),
                self.min_training_points
            )));
        }
        let features: Vec<[f64; MarketDataPoint::FEATURE_DIM]> =
            history.iter().map(MarketDataPoint::features).collect();
        let mut stats = FeatureStats::default();
        for d in 0..MarketDataPoint::FEATURE_DIM {
            let column: Vec<f64> = features.iter().map(|f| f[d]).collect();
            let (mean, std) = mean_std(&column);
            stats.mean[d] = mean;
            stats.std[d] = std;
        }

        *self.stats.write().await = Some(stats);
        self.trained.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn detect(
        &self,
        market_data: &[MarketDataPoint],
        market_state: Option<&MarketState>,
    ) -> Result<DetectionReport> {
        let stats = self
            .stats
            .read()
            .await
            .clone()
            .ok_or_else(|| AdaptiveError::ModelUnavailable("z-score baseline not calibrated".to_string()))?;
        if market_data.is_empty() {
            return Err(AdaptiveError::InsufficientData("empty market window".to_string()));
        }

        let mut scores = Vec::with_capacity(market_data.len());
        let mut worst = (f64::NEG_INFINITY, [0.0; MarketDataPoint::FEATURE_DIM]);
        for point in market_data {
            let f = point.features();
            let mut z = [0.0; MarketDataPoint::FEATURE_DIM];
            for d in 0..MarketDataPoint::FEATURE_DIM {
                // Constant features carry no signal
                if stats.std[d] > 1e-12 {
                    z[d] = ((f[d] - stats.mean[d]) / stats.std[d]).abs();
                }
            }
            let score = z.iter().copied().fold(0.0_f64, f64::max);
            if score > worst.0 {
                worst = (score, z);
            }
            scores.push(score);
        }

        Ok(DetectionReport::build(
            self.name(),
            scores,
            self.z_threshold,
            contributions(&worst.1),
            market_state,
        ))
    }
}

//! Dense network inference (CPU-only).
//!
//! Serves two roles:
//! - autoencoder: `reconstruction_error` between an input and its regenerated output
//! - Q-network: one output per discrete action, turned into preferences via `softmax`
//!
//! Shapes are validated on load so callers can fall back instead of panicking.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AdaptiveError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => {
                if x >= 0.0 {
                    1.0 / (1.0 + (-x).exp())
                } else {
                    let z = x.exp();
                    z / (1.0 + z)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Row-major `[out_dim][in_dim]`
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    pub fn out_dim(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let z = row.iter().zip(x).fold(*b, |acc, (w, v)| acc + w * v);
                self.activation.apply(z)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub input_dim: usize,
    /// Optional z-score normalisation applied before the first layer
    #[serde(default)]
    pub input_mean: Option<Vec<f64>>,
    #[serde(default)]
    pub input_std: Option<Vec<f64>>,
    pub layers: Vec<DenseLayer>,
    /// Free-form metadata; `model_version` and `training_epoch` are read if present
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DenseNetwork {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(content)?;
        model.validate().map_err(AdaptiveError::Validation)?;
        Ok(model)
    }

    /// Single linear layer that ignores its input and always emits `output`.
    ///
    /// As an autoencoder this reconstructs the training mean, so the
    /// reconstruction error is the distance from that mean.
    pub fn constant(input_dim: usize, output: Vec<f64>) -> Self {
        Self {
            input_dim,
            input_mean: None,
            input_std: None,
            layers: vec![DenseLayer {
                weights: vec![vec![0.0; input_dim]; output.len()],
                bias: output,
                activation: Activation::Linear,
            }],
            metadata: serde_json::json!({}),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }
        match (&self.input_mean, &self.input_std) {
            (Some(mean), Some(std)) => {
                if mean.len() != self.input_dim || std.len() != self.input_dim {
                    return Err(format!(
                        "normalisation vectors must have length input_dim={}",
                        self.input_dim
                    ));
                }
                if std.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                    return Err("input_std must be finite and > 0".to_string());
                }
            }
            (None, None) => {}
            _ => return Err("input_mean and input_std must be provided together".to_string()),
        }

        let mut expected_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.out_dim() == 0 || layer.bias.len() != layer.out_dim() {
                return Err(format!(
                    "layer[{idx}] has {} weight rows and {} biases",
                    layer.out_dim(),
                    layer.bias.len()
                ));
            }
            if let Some(r) = layer.weights.iter().position(|row| row.len() != expected_in) {
                return Err(format!(
                    "layer[{idx}] weights row {r} does not match in_dim {expected_in}"
                ));
            }
            let finite = layer.weights.iter().flatten().chain(&layer.bias).all(|v| v.is_finite());
            if !finite {
                return Err(format!("layer[{idx}] contains non-finite values"));
            }
            expected_in = layer.out_dim();
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(DenseLayer::out_dim).unwrap_or(0)
    }

    pub fn model_version(&self) -> Option<String> {
        self.metadata
            .get("model_version")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn training_epoch(&self) -> Option<u64> {
        self.metadata.get("training_epoch").and_then(|v| v.as_u64())
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_dim {
            return Err(AdaptiveError::Validation(format!(
                "DenseNetwork input len {} != input_dim {}",
                input.len(),
                self.input_dim
            )));
        }
        if input.iter().any(|v| !v.is_finite()) {
            return Err(AdaptiveError::Validation(
                "DenseNetwork input contains non-finite values".to_string(),
            ));
        }

        let mut x = match (&self.input_mean, &self.input_std) {
            (Some(mean), Some(std)) => input
                .iter()
                .zip(mean.iter().zip(std))
                .map(|(v, (m, s))| (v - m) / s.max(1e-12))
                .collect(),
            _ => input.to_vec(),
        };
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        Ok(x)
    }

    /// Mean squared error between `input` and the network's reconstruction of it.
    pub fn reconstruction_error(&self, input: &[f64]) -> Result<f64> {
        if self.output_dim() != self.input_dim {
            return Err(AdaptiveError::Validation(format!(
                "autoencoder output_dim {} != input_dim {}",
                self.output_dim(),
                self.input_dim
            )));
        }
        let output = self.forward(input)?;
        let sse: f64 = input
            .iter()
            .zip(&output)
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        Ok(sse / self.input_dim as f64)
    }
}

/// Temperature-scaled softmax; returns a uniform distribution for degenerate input.
pub fn softmax(values: &[f64], temperature: f64) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let t = if temperature > 0.0 { temperature } else { 1.0 };
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| ((v - max) / t).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return vec![1.0 / values.len() as f64; values.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_sigmoid_layer() {
        let net = DenseNetwork {
            input_dim: 2,
            input_mean: None,
            input_std: None,
            layers: vec![DenseLayer {
                weights: vec![vec![1.0, 2.0]],
                bias: vec![0.0],
                activation: Activation::Sigmoid,
            }],
            metadata: serde_json::json!({ "model_version": "clf-1" }),
        };
        net.validate().unwrap();

        let p0 = net.forward(&[0.0, 0.0]).unwrap()[0];
        assert!((p0 - 0.5).abs() < 1e-12);
        assert!(net.forward(&[1.0, 0.0]).unwrap()[0] > 0.5);
        assert_eq!(net.model_version().as_deref(), Some("clf-1"));
        assert!(net.forward(&[1.0]).is_err());
    }

    #[test]
    fn rejects_shape_mismatch() {
        let json = r#"{
            "input_dim": 3,
            "layers": [{ "weights": [[1.0, 2.0]], "bias": [0.0] }]
        }"#;
        assert!(matches!(
            DenseNetwork::from_json(json),
            Err(AdaptiveError::Validation(_))
        ));
    }

    #[test]
    fn constant_autoencoder_error_is_distance_from_mean() {
        let ae = DenseNetwork::constant(2, vec![1.0, 1.0]);
        assert_eq!(ae.reconstruction_error(&[1.0, 1.0]).unwrap(), 0.0);
        // ((3-1)^2 + (1-1)^2) / 2
        assert_eq!(ae.reconstruction_error(&[3.0, 1.0]).unwrap(), 2.0);
    }

    #[test]
    fn softmax_is_a_distribution() {
        let p = softmax(&[1.0, 2.0, 3.0], 1.0);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[2] > p[1] && p[1] > p[0]);
        assert_eq!(softmax(&[f64::NAN, 1.0], 1.0), vec![0.5, 0.5]);
    }
}

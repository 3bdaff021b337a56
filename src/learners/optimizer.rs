//! Parameter optimizers.
//!
//! `GaussianProcessOptimizer` fits an RBF-kernel GP to (parameters -> Sharpe)
//! observations per strategy and picks the candidate with the highest expected
//! improvement. `HeuristicOptimizer` replays the best observed parameter set
//! with regime nudges and needs no numerical model.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::stats::{
    backward_substitute, cholesky, forward_substitute, mean_std, normal_cdf, normal_pdf,
    percentile,
};
use super::ParameterOptimizer;
use crate::domain::{
    BacktestResult, MarketRegime, MarketState, OptimizedStrategyParameters, ParameterBounds,
    PerformanceSample, VolatilityEnvironment, METHOD_BAYESIAN_GP, METHOD_RULE_BASED,
    METHOD_SAFE_MODE_FALLBACK, validate_bounds,
};
use crate::error::{AdaptiveError, Result};

#[derive(Debug, Clone)]
pub struct GaussianProcessConfig {
    /// Observations required before the GP is trusted
    pub min_samples: usize,
    /// Observations kept per strategy (oldest dropped)
    pub max_samples: usize,
    /// RBF length scale in normalised [0, 1] parameter space
    pub length_scale: f64,
    pub signal_variance: f64,
    pub noise_variance: f64,
    /// Random candidates scored by the acquisition function
    pub num_candidates: usize,
    /// Expected-improvement exploration margin
    pub exploration_xi: f64,
    /// Fixed RNG seed for reproducible suggestions
    pub seed: Option<u64>,
}

impl Default for GaussianProcessConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            max_samples: 200,
            length_scale: 0.3,
            signal_variance: 1.0,
            noise_variance: 1e-2,
            num_candidates: 256,
            exploration_xi: 0.01,
            seed: None,
        }
    }
}

/// Fitted GP posterior over normalised inputs and standardised objective.
struct GpModel {
    xs: Vec<Vec<f64>>,
    chol: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    y_mean: f64,
    y_std: f64,
    length_scale: f64,
    signal_variance: f64,
}

impl GpModel {
    fn fit(xs: Vec<Vec<f64>>, ys: &[f64], config: &GaussianProcessConfig) -> Option<Self> {
        let (y_mean, y_std) = mean_std(ys);
        let y_std = if y_std < 1e-12 { 1.0 } else { y_std };
        let y: Vec<f64> = ys.iter().map(|v| (v - y_mean) / y_std).collect();

        let mut model = Self {
            xs,
            chol: Vec::new(),
            alpha: Vec::new(),
            y_mean,
            y_std,
            length_scale: config.length_scale,
            signal_variance: config.signal_variance,
        };

        let n = model.xs.len();
        let mut k = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let v = model.kernel(&model.xs[i], &model.xs[j]);
                k[i][j] = v;
                k[j][i] = v;
            }
            k[i][i] += config.noise_variance;
        }

        model.chol = cholesky(&k)?;
        model.alpha = backward_substitute(&model.chol, &forward_substitute(&model.chol, &y));
        Some(model)
    }

    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
        self.signal_variance * (-sq / (2.0 * self.length_scale.powi(2))).exp()
    }

    /// Posterior mean and standard deviation in standardised units.
    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star: Vec<f64> = self.xs.iter().map(|xi| self.kernel(x, xi)).collect();
        let mean: f64 = k_star.iter().zip(&self.alpha).map(|(k, a)| k * a).sum();
        let v = forward_substitute(&self.chol, &k_star);
        let var = (self.signal_variance - v.iter().map(|x| x * x).sum::<f64>()).max(1e-12);
        (mean, var.sqrt())
    }

    fn to_objective(&self, standardised: f64) -> f64 {
        standardised * self.y_std + self.y_mean
    }

    /// Leave-one-out RMSE (standardised units) via the closed form `alpha_i / [K^-1]_ii`.
    fn loo_rmse(&self) -> f64 {
        let n = self.xs.len();
        let mut sq_sum = 0.0;
        for i in 0..n {
            let mut e = vec![0.0; n];
            e[i] = 1.0;
            let col = backward_substitute(&self.chol, &forward_substitute(&self.chol, &e));
            let residual = self.alpha[i] / col[i].max(1e-12);
            sq_sum += residual * residual;
        }
        (sq_sum / n as f64).sqrt()
    }
}

fn expected_improvement(mean: f64, sd: f64, best: f64, xi: f64) -> f64 {
    if sd <= 1e-12 {
        return (mean - best - xi).max(0.0);
    }
    let improvement = mean - best - xi;
    let z = improvement / sd;
    improvement * normal_cdf(z) + sd * normal_pdf(z)
}

/// Search bounds: caller-provided where given, otherwise the observed range.
fn resolve_bounds(
    samples: &[PerformanceSample],
    given: Option<&BTreeMap<String, ParameterBounds>>,
) -> BTreeMap<String, ParameterBounds> {
    let mut bounds = BTreeMap::new();
    for sample in samples {
        for (name, value) in &sample.parameters {
            let entry = bounds
                .entry(name.clone())
                .or_insert_with(|| ParameterBounds::new(*value, *value));
            entry.min = entry.min.min(*value);
            entry.max = entry.max.max(*value);
        }
    }
    for b in bounds.values_mut() {
        if b.width() < 1e-12 {
            let center = b.min;
            let spread = if center.abs() > 1e-12 { center.abs() * 0.5 } else { 1.0 };
            *b = ParameterBounds::new(center - spread, center + spread);
        }
    }
    if let Some(given) = given {
        for (name, b) in given {
            bounds.insert(name.clone(), *b);
        }
    }
    bounds
}

fn normalise(value: f64, b: &ParameterBounds) -> f64 {
    let width = if b.width() > 0.0 { b.width() } else { 1.0 };
    ((value - b.min) / width).clamp(0.0, 1.0)
}

fn denormalise(x: f64, b: &ParameterBounds) -> f64 {
    b.clamp(b.min + x * b.width().max(0.0))
}

/// Return-distribution risk metrics: (VaR 95, expected shortfall, maximum loss).
fn tail_risk(returns: &[f64]) -> (f64, f64, f64) {
    let Some(var_95) = percentile(returns, 5.0) else {
        return (0.0, 0.0, 0.0);
    };
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= var_95).collect();
    let shortfall = if tail.is_empty() {
        var_95
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    };
    let max_loss = returns.iter().copied().fold(f64::INFINITY, f64::min);
    (var_95, shortfall, max_loss)
}

/// Samples for the requested regime when there are enough, else all of them.
fn regime_pool(
    samples: Vec<PerformanceSample>,
    regime: Option<MarketRegime>,
    min_samples: usize,
) -> (Vec<PerformanceSample>, Option<MarketRegime>) {
    if let Some(regime) = regime {
        let matching: Vec<PerformanceSample> = samples
            .iter()
            .filter(|s| s.regime == Some(regime))
            .cloned()
            .collect();
        if matching.len() >= min_samples.max(1) {
            return (matching, Some(regime));
        }
    }
    (samples, None)
}

fn push_bounded(
    store: &mut HashMap<String, Vec<PerformanceSample>>,
    sample: PerformanceSample,
    max_samples: usize,
) -> usize {
    let history = store.entry(sample.strategy_id.clone()).or_default();
    history.push(sample);
    if history.len() > max_samples {
        let excess = history.len() - max_samples;
        history.drain(..excess);
    }
    history.len()
}

/// Bayesian optimizer backed by a Gaussian-process surrogate
pub struct GaussianProcessOptimizer {
    config: GaussianProcessConfig,
    samples: RwLock<HashMap<String, Vec<PerformanceSample>>>,
}

impl GaussianProcessOptimizer {
    pub fn new(config: GaussianProcessConfig) -> Self {
        Self {
            config,
            samples: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(GaussianProcessConfig::default())
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[async_trait]
impl ParameterOptimizer for GaussianProcessOptimizer {
    fn name(&self) -> &str {
        "bayesian_optimizer"
    }

    async fn update(&self, result: &BacktestResult) -> Result<()> {
        if result.parameters.is_empty() {
            return Err(AdaptiveError::InsufficientData(format!(
                "backtest for {} carries no parameters",
                result.strategy_id
            )));
        }
        let mut samples = self.samples.write().await;
        let count = push_bounded(&mut samples, result.to_sample(), self.config.max_samples);
        debug!(strategy = %result.strategy_id, samples = count, "GP optimizer observed backtest");
        Ok(())
    }

    async fn suggest_parameters(
        &self,
        strategy_id: &str,
        parameter_bounds: Option<&BTreeMap<String, ParameterBounds>>,
        market_state: Option<&MarketState>,
    ) -> Result<OptimizedStrategyParameters> {
        if let Some(bounds) = parameter_bounds {
            validate_bounds(bounds)?;
        }
        let started = Instant::now();
        let history = {
            let samples = self.samples.read().await;
            samples.get(strategy_id).cloned().unwrap_or_default()
        };
        let (pool, regime) = regime_pool(
            history,
            market_state.map(|s| s.regime),
            self.config.min_samples,
        );
        if pool.len() < self.config.min_samples {
            return Err(AdaptiveError::InsufficientData(format!(
                "{strategy_id}: {} samples < {} required",
                pool.len(),
                self.config.min_samples
            )));
        }

        let bounds = resolve_bounds(&pool, parameter_bounds);
        let names: Vec<&String> = bounds.keys().collect();
        let xs: Vec<Vec<f64>> = pool
            .iter()
            .map(|s| {
                names
                    .iter()
                    .map(|n| match s.parameters.get(*n) {
                        Some(v) => normalise(*v, &bounds[*n]),
                        None => 0.5,
                    })
                    .collect()
            })
            .collect();
        let ys: Vec<f64> = pool.iter().map(|s| s.objective).collect();

        let model = GpModel::fit(xs.clone(), &ys, &self.config).ok_or_else(|| {
            AdaptiveError::component(self.name(), "kernel matrix is not positive definite")
        })?;

        let best_idx = ys
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let best_standardised = (ys[best_idx] - model.y_mean) / model.y_std;

        let mut rng = self.rng();
        let dim = names.len();
        let mut best_candidate = xs[best_idx].clone();
        let (m, s) = model.predict(&best_candidate);
        let mut best_score = expected_improvement(m, s, best_standardised, self.config.exploration_xi);
        let mut best_pred = (m, s);

        for i in 0..self.config.num_candidates {
            let candidate: Vec<f64> = if i % 4 == 0 {
                // Local perturbation around the incumbent
                xs[best_idx]
                    .iter()
                    .map(|v| (v + rng.gen_range(-0.1..0.1)).clamp(0.0, 1.0))
                    .collect()
            } else {
                (0..dim).map(|_| rng.gen_range(0.0..1.0)).collect()
            };
            let (mean, sd) = model.predict(&candidate);
            let score = expected_improvement(mean, sd, best_standardised, self.config.exploration_xi);
            if score > best_score {
                best_score = score;
                best_candidate = candidate;
                best_pred = (mean, sd);
            }
        }

        let mut result = OptimizedStrategyParameters::new(strategy_id, METHOD_BAYESIAN_GP)
            .for_market_state(market_state);
        if regime.is_none() {
            result.optimized_for_regime = None;
        }
        for (name, x) in names.iter().zip(&best_candidate) {
            result
                .parameters
                .insert((*name).clone(), denormalise(*x, &bounds[*name]));
        }

        // Kernel-weighted neighbourhood estimates around the suggestion
        let weights: Vec<f64> = xs
            .iter()
            .map(|xi| model.kernel(&best_candidate, xi) / model.signal_variance)
            .collect();
        let weight_sum: f64 = weights.iter().sum();
        let weighted = |f: fn(&PerformanceSample) -> f64| -> f64 {
            if weight_sum > 1e-12 {
                pool.iter().zip(&weights).map(|(s, w)| f(s) * w).sum::<f64>() / weight_sum
            } else {
                pool.iter().map(f).sum::<f64>() / pool.len() as f64
            }
        };
        let returns: Vec<f64> = pool.iter().map(|s| s.total_return).collect();

        result.sharpe_ratio = model.to_objective(best_pred.0);
        result.expected_return = weighted(|s| s.total_return);
        result.max_drawdown = weighted(|s| s.max_drawdown);
        result.win_rate = weighted(|s| s.win_rate);
        result.expected_volatility = if result.sharpe_ratio.abs() > 1e-9 {
            (result.expected_return / result.sharpe_ratio).abs()
        } else {
            mean_std(&returns).1
        };

        result.optimization_score =
            (1.0 - best_pred.1 / model.signal_variance.sqrt()).clamp(0.0, 1.0);
        result.out_of_sample_performance = 1.0 / (1.0 + model.loo_rmse());

        let mut top: Vec<usize> = (0..pool.len()).collect();
        top.sort_by(|a, b| ys[*b].total_cmp(&ys[*a]));
        top.truncate(3);
        let spread: f64 = (0..dim)
            .map(|d| {
                let coords: Vec<f64> = top.iter().map(|i| xs[*i][d]).collect();
                mean_std(&coords).1
            })
            .sum::<f64>()
            / dim.max(1) as f64;
        result.parameter_stability = (1.0 - 2.0 * spread).clamp(0.0, 1.0);

        let (var_95, shortfall, max_loss) = tail_risk(&returns);
        result.var_95 = var_95;
        result.expected_shortfall = shortfall;
        result.maximum_loss = max_loss;

        let h = 0.05;
        for (d, name) in names.iter().enumerate() {
            let mut up = best_candidate.clone();
            let mut down = best_candidate.clone();
            up[d] = (up[d] + h).min(1.0);
            down[d] = (down[d] - h).max(0.0);
            let dx = (up[d] - down[d]) * bounds[*name].width();
            let sensitivity = if dx.abs() > 1e-12 {
                (model.to_objective(model.predict(&up).0) - model.to_objective(model.predict(&down).0))
                    / dx
            } else {
                0.0
            };
            result.parameter_sensitivity.insert((*name).clone(), sensitivity);
        }

        result.parameter_bounds = bounds.clone();
        result.iterations = self.config.num_candidates as u32;
        result.optimization_duration_ms = started.elapsed().as_millis() as u64;
        result.constraints.insert(
            "samples_used".to_string(),
            serde_json::json!(pool.len()),
        );

        info!(
            strategy = strategy_id,
            samples = pool.len(),
            expected_sharpe = result.sharpe_ratio,
            "GP optimizer suggested parameters"
        );
        Ok(result)
    }

    async fn sample_count(&self, strategy_id: &str) -> usize {
        self.samples
            .read()
            .await
            .get(strategy_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Rule-based optimizer: best observed parameters plus regime nudges
pub struct HeuristicOptimizer {
    max_samples: usize,
    samples: RwLock<HashMap<String, Vec<PerformanceSample>>>,
}

impl HeuristicOptimizer {
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples: max_samples.max(1),
            samples: RwLock::new(HashMap::new()),
        }
    }

    /// Shorter-dated risk in stressed volatility: smaller deltas, earlier profit taking.
    fn apply_regime_nudges(parameters: &mut BTreeMap<String, f64>, state: Option<&MarketState>) {
        let Some(state) = state else {
            return;
        };
        let stressed = state.regime == MarketRegime::HighVolatility
            || matches!(
                state.volatility_environment,
                VolatilityEnvironment::Elevated | VolatilityEnvironment::High
            );
        if !stressed {
            return;
        }
        for (name, value) in parameters.iter_mut() {
            if name.contains("delta") || name == "profit_target" {
                *value *= 0.8;
            }
        }
    }
}

impl Default for HeuristicOptimizer {
    fn default() -> Self {
        Self::new(200)
    }
}

#[async_trait]
impl ParameterOptimizer for HeuristicOptimizer {
    fn name(&self) -> &str {
        "heuristic_optimizer"
    }

    async fn update(&self, result: &BacktestResult) -> Result<()> {
        let mut samples = self.samples.write().await;
        push_bounded(&mut samples, result.to_sample(), self.max_samples);
        Ok(())
    }

    async fn suggest_parameters(
        &self,
        strategy_id: &str,
        parameter_bounds: Option<&BTreeMap<String, ParameterBounds>>,
        market_state: Option<&MarketState>,
    ) -> Result<OptimizedStrategyParameters> {
        if let Some(bounds) = parameter_bounds {
            validate_bounds(bounds)?;
        }
        let history = {
            let samples = self.samples.read().await;
            samples.get(strategy_id).cloned().unwrap_or_default()
        };

        let best = history
            .iter()
            .filter(|s| !s.parameters.is_empty())
            .max_by(|a, b| a.objective.total_cmp(&b.objective));

        let mut result = match best {
            Some(best) => {
                let mut r = OptimizedStrategyParameters::new(strategy_id, METHOD_RULE_BASED)
                    .for_market_state(market_state);
                r.parameters = best.parameters.clone();
                r.sharpe_ratio = best.objective;
                r.expected_return = best.total_return;
                r.max_drawdown = best.max_drawdown;
                r.win_rate = best.win_rate;
                r.optimization_score = (history.len() as f64 / 10.0).min(1.0) * 0.5;
                r
            }
            None => OptimizedStrategyParameters::safe_mode(
                strategy_id,
                market_state,
                METHOD_SAFE_MODE_FALLBACK,
            ),
        };

        Self::apply_regime_nudges(&mut result.parameters, market_state);
        if let Some(bounds) = parameter_bounds {
            for (name, b) in bounds {
                if let Some(v) = result.parameters.get_mut(name) {
                    *v = b.clamp(*v);
                }
            }
            result.parameter_bounds = bounds.clone();
        }
        result.iterations = history.len() as u32;
        Ok(result)
    }

    async fn sample_count(&self, strategy_id: &str) -> usize {
        self.samples
            .read()
            .await
            .get(strategy_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backtest(strategy: &str, delta: f64, dte: f64, sharpe: f64) -> BacktestResult {
        let mut params = BTreeMap::new();
        params.insert("strike_delta".to_string(), delta);
        params.insert("days_to_expiry".to_string(), dte);
        BacktestResult::new(strategy, params).with_metrics(sharpe, 0.6, 0.1, sharpe / 10.0)
    }

    fn seeded() -> GaussianProcessOptimizer {
        GaussianProcessOptimizer::new(GaussianProcessConfig {
            seed: Some(7),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_gp_requires_min_samples() {
        let opt = seeded();
        for i in 0..4 {
            opt.update(&backtest("iron_condor", 0.1 + i as f64 * 0.02, 30.0, 1.0))
                .await
                .unwrap();
        }
        let err = opt.suggest_parameters("iron_condor", None, None).await.unwrap_err();
        assert!(matches!(err, AdaptiveError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn test_gp_suggests_within_bounds() {
        let opt = seeded();
        // Sharpe peaks around delta 0.16
        for (i, delta) in [0.05, 0.10, 0.14, 0.16, 0.18, 0.22, 0.30].iter().enumerate() {
            let sharpe = 2.0 - 40.0 * (delta - 0.16_f64).powi(2);
            opt.update(&backtest("iron_condor", *delta, 30.0 + i as f64 * 5.0, sharpe))
                .await
                .unwrap();
        }

        let mut bounds = BTreeMap::new();
        bounds.insert("strike_delta".to_string(), ParameterBounds::new(0.05, 0.30));
        let params = opt
            .suggest_parameters("iron_condor", Some(&bounds), None)
            .await
            .unwrap();

        assert_eq!(params.optimization_method, METHOD_BAYESIAN_GP);
        let delta = params.get("strike_delta").unwrap();
        assert!((0.05..=0.30).contains(&delta));
        let dte = params.get("days_to_expiry").unwrap();
        assert!((30.0..=60.0).contains(&dte));
        assert!(params.get_confidence_score() > 0.0);
        assert!(params.parameter_sensitivity.contains_key("strike_delta"));
        assert_eq!(opt.sample_count("iron_condor").await, 7);
    }

    #[tokio::test]
    async fn test_gp_rejects_nan_bounds() {
        let opt = seeded();
        for delta in [0.05, 0.10, 0.16, 0.22, 0.30] {
            opt.update(&backtest("iron_condor", delta, 45.0, 1.0)).await.unwrap();
        }
        let mut bounds = BTreeMap::new();
        bounds.insert("strike_delta".to_string(), ParameterBounds::new(f64::NAN, 0.30));

        let err = opt
            .suggest_parameters("iron_condor", Some(&bounds), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdaptiveError::Validation(_)));
    }

    #[tokio::test]
    async fn test_heuristic_rejects_inverted_bounds() {
        let opt = HeuristicOptimizer::default();
        opt.update(&backtest("iron_condor", 0.16, 45.0, 1.5)).await.unwrap();
        let mut bounds = BTreeMap::new();
        bounds.insert("strike_delta".to_string(), ParameterBounds::new(0.3, 0.1));

        let err = opt
            .suggest_parameters("iron_condor", Some(&bounds), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdaptiveError::Validation(_)));
    }

    #[tokio::test]
    async fn test_sample_history_is_bounded() {
        let opt = GaussianProcessOptimizer::new(GaussianProcessConfig {
            max_samples: 3,
            ..Default::default()
        });
        for i in 0..5 {
            opt.update(&backtest("wheel", 0.3, 30.0 + i as f64, 1.0)).await.unwrap();
        }
        assert_eq!(opt.sample_count("wheel").await, 3);
    }

    #[tokio::test]
    async fn test_heuristic_without_history_uses_rule_table() {
        let opt = HeuristicOptimizer::default();
        let params = opt.suggest_parameters("wheel", None, None).await.unwrap();
        assert_eq!(params.optimization_method, METHOD_SAFE_MODE_FALLBACK);
        assert_eq!(params.get("put_delta"), Some(0.30));
    }

    #[tokio::test]
    async fn test_heuristic_replays_best_sample_with_nudges() {
        let opt = HeuristicOptimizer::default();
        opt.update(&backtest("iron_condor", 0.20, 30.0, 0.5)).await.unwrap();
        opt.update(&backtest("iron_condor", 0.15, 45.0, 1.8)).await.unwrap();

        let calm = MarketState::new(MarketRegime::Sideways, VolatilityEnvironment::Low);
        let params = opt.suggest_parameters("iron_condor", None, Some(&calm)).await.unwrap();
        assert_eq!(params.optimization_method, METHOD_RULE_BASED);
        assert_eq!(params.get("strike_delta"), Some(0.15));
        assert_eq!(params.get("days_to_expiry"), Some(45.0));

        let stressed = MarketState::new(MarketRegime::Bear, VolatilityEnvironment::High);
        let params = opt
            .suggest_parameters("iron_condor", None, Some(&stressed))
            .await
            .unwrap();
        assert!((params.get("strike_delta").unwrap() - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_tail_risk_metrics() {
        let returns: Vec<f64> = (0..20).map(|i| i as f64 / 100.0 - 0.05).collect();
        let (var_95, shortfall, max_loss) = tail_risk(&returns);
        assert!(var_95 < 0.0);
        assert!(shortfall <= var_95);
        assert_eq!(max_loss, -0.05);
    }
}

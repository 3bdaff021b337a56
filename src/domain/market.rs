//! Market context snapshots consumed by the learners.
//!
//! A `MarketState` is created per decision cycle by the caller. Apart from
//! `regime`, which a regime detector may assign, it is not mutated after
//! construction. No range validation or clipping is done here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Categorical market trend classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
    HighVolatility,
    LowVolatility,
    Trending,
    MeanReverting,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 7] = [
        MarketRegime::Bull,
        MarketRegime::Bear,
        MarketRegime::Sideways,
        MarketRegime::HighVolatility,
        MarketRegime::LowVolatility,
        MarketRegime::Trending,
        MarketRegime::MeanReverting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Bull => "bull",
            MarketRegime::Bear => "bear",
            MarketRegime::Sideways => "sideways",
            MarketRegime::HighVolatility => "high_volatility",
            MarketRegime::LowVolatility => "low_volatility",
            MarketRegime::Trending => "trending",
            MarketRegime::MeanReverting => "mean_reverting",
        }
    }
}

impl Default for MarketRegime {
    fn default() -> Self {
        Self::Sideways
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Volatility environment classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityEnvironment {
    Low,
    Normal,
    Elevated,
    High,
}

impl VolatilityEnvironment {
    pub const ALL: [VolatilityEnvironment; 4] = [
        VolatilityEnvironment::Low,
        VolatilityEnvironment::Normal,
        VolatilityEnvironment::Elevated,
        VolatilityEnvironment::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityEnvironment::Low => "low",
            VolatilityEnvironment::Normal => "normal",
            VolatilityEnvironment::Elevated => "elevated",
            VolatilityEnvironment::High => "high",
        }
    }

    /// Classify from a VIX level.
    pub fn from_vix(vix: f64) -> Self {
        if vix < 15.0 {
            Self::Low
        } else if vix < 20.0 {
            Self::Normal
        } else if vix < 30.0 {
            Self::Elevated
        } else {
            Self::High
        }
    }
}

impl Default for VolatilityEnvironment {
    fn default() -> Self {
        Self::Normal
    }
}

impl std::fmt::Display for VolatilityEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of market conditions used as decision context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub state_id: String,
    pub timestamp: DateTime<Utc>,
    /// Session tag (e.g., "regular", "pre_market")
    pub session: String,
    pub regime: MarketRegime,
    pub volatility_environment: VolatilityEnvironment,

    // Price / volume
    pub underlying_price: f64,
    pub underlying_change_pct: f64,
    pub volume: f64,
    pub avg_volume: f64,

    // Volatility
    pub vix: f64,
    pub vix_change_pct: f64,
    pub realized_vol_10d: f64,
    pub realized_vol_30d: f64,
    pub implied_vol: f64,
    pub iv_rank: f64,
    pub iv_percentile: f64,
    pub put_call_ratio: f64,
    pub skew: f64,
    pub term_structure_slope: f64,

    // Technicals
    pub rsi_14: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub bollinger_position: f64,
    pub atr_14: f64,
    pub sma_20_distance: f64,
    pub sma_50_distance: f64,

    // Sentiment
    pub sentiment_score: f64,
    pub news_sentiment: f64,
    pub fear_greed_index: f64,
    pub days_to_earnings: f64,

    #[serde(default)]
    pub custom_features: BTreeMap<String, f64>,
}

impl Default for MarketState {
    fn default() -> Self {
        Self {
            state_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            session: "regular".to_string(),
            regime: MarketRegime::default(),
            volatility_environment: VolatilityEnvironment::default(),
            underlying_price: 0.0,
            underlying_change_pct: 0.0,
            volume: 0.0,
            avg_volume: 0.0,
            vix: 0.0,
            vix_change_pct: 0.0,
            realized_vol_10d: 0.0,
            realized_vol_30d: 0.0,
            implied_vol: 0.0,
            iv_rank: 0.0,
            iv_percentile: 0.0,
            put_call_ratio: 0.0,
            skew: 0.0,
            term_structure_slope: 0.0,
            rsi_14: 50.0,
            macd: 0.0,
            macd_signal: 0.0,
            bollinger_position: 0.5,
            atr_14: 0.0,
            sma_20_distance: 0.0,
            sma_50_distance: 0.0,
            sentiment_score: 0.0,
            news_sentiment: 0.0,
            fear_greed_index: 50.0,
            days_to_earnings: 0.0,
            custom_features: BTreeMap::new(),
        }
    }
}

impl MarketState {
    /// Fresh snapshot with a new `state_id` and the current timestamp.
    pub fn new(regime: MarketRegime, volatility_environment: VolatilityEnvironment) -> Self {
        Self {
            regime,
            volatility_environment,
            ..Default::default()
        }
    }

    /// Assign the regime classification (the only post-construction mutation).
    pub fn set_regime(&mut self, regime: MarketRegime) {
        self.regime = regime;
    }

    fn numeric_fields(&self) -> [(&'static str, f64); 25] {
        [
            ("underlying_price", self.underlying_price),
            ("underlying_change_pct", self.underlying_change_pct),
            ("volume", self.volume),
            ("avg_volume", self.avg_volume),
            ("vix", self.vix),
            ("vix_change_pct", self.vix_change_pct),
            ("realized_vol_10d", self.realized_vol_10d),
            ("realized_vol_30d", self.realized_vol_30d),
            ("implied_vol", self.implied_vol),
            ("iv_rank", self.iv_rank),
            ("iv_percentile", self.iv_percentile),
            ("put_call_ratio", self.put_call_ratio),
            ("skew", self.skew),
            ("term_structure_slope", self.term_structure_slope),
            ("rsi_14", self.rsi_14),
            ("macd", self.macd),
            ("macd_signal", self.macd_signal),
            ("bollinger_position", self.bollinger_position),
            ("atr_14", self.atr_14),
            ("sma_20_distance", self.sma_20_distance),
            ("sma_50_distance", self.sma_50_distance),
            ("sentiment_score", self.sentiment_score),
            ("news_sentiment", self.news_sentiment),
            ("fear_greed_index", self.fear_greed_index),
            ("days_to_earnings", self.days_to_earnings),
        ]
    }

    /// Fixed-shape numeric mapping for models.
    ///
    /// Every enum variant gets a one-hot `regime_*` / `volatility_*` entry, so the
    /// key set only varies with `custom_features` (prefixed `custom_`).
    pub fn to_feature_vector(&self) -> BTreeMap<String, f64> {
        let mut features: BTreeMap<String, f64> = self
            .numeric_fields()
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();

        for regime in MarketRegime::ALL {
            let hot = if regime == self.regime { 1.0 } else { 0.0 };
            features.insert(format!("regime_{}", regime.as_str()), hot);
        }
        for env in VolatilityEnvironment::ALL {
            let hot = if env == self.volatility_environment { 1.0 } else { 0.0 };
            features.insert(format!("volatility_{}", env.as_str()), hot);
        }
        for (name, value) in &self.custom_features {
            features.insert(format!("custom_{name}"), *value);
        }

        features
    }

    /// Feature values in key order, for dense model input.
    pub fn feature_values(&self) -> Vec<f64> {
        self.to_feature_vector().into_values().collect()
    }

    /// Number of features produced without custom features.
    pub const BASE_FEATURE_COUNT: usize = 25 + MarketRegime::ALL.len() + VolatilityEnvironment::ALL.len();
}

/// One bar of market data fed to the anomaly detectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataPoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub implied_vol: Option<f64>,
}

impl MarketDataPoint {
    pub const FEATURE_DIM: usize = 4;
    pub const FEATURE_NAMES: [&'static str; Self::FEATURE_DIM] =
        ["return", "range", "log_volume", "implied_vol"];

    /// Bar features: simple return, range, volume (log1p), implied vol.
    pub fn features(&self) -> [f64; Self::FEATURE_DIM] {
        let ret = if self.open > 0.0 {
            (self.close - self.open) / self.open
        } else {
            0.0
        };
        let range = if self.open > 0.0 {
            (self.high - self.low) / self.open
        } else {
            0.0
        };
        [
            ret,
            range,
            self.volume.max(0.0).ln_1p(),
            self.implied_vol.unwrap_or(0.0),
        ]
    }
}

//! Position-sizing hook chain types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;

/// Context handed to every hook in the chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SizingContext {
    pub strategy_id: Option<String>,
    pub base_size: Option<f64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SizingContext {
    pub fn for_strategy(strategy_id: impl Into<String>) -> Self {
        Self {
            strategy_id: Some(strategy_id.into()),
            ..Default::default()
        }
    }
}

/// `(current_multiplier, context) -> new_multiplier`.
///
/// An `Err`, a non-finite value or a negative value makes the chain skip this hook.
pub type PositionSizingHook = Arc<dyn Fn(f64, &SizingContext) -> Result<f64> + Send + Sync>;

/// `(base_size, context) -> adjusted_size`, for external position sizing systems.
pub type PositionSizer = Arc<dyn Fn(f64, &SizingContext) -> f64 + Send + Sync>;

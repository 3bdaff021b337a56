//! Anomaly-gated risk posture.
//!
//! `AdaptiveManager` owns the single "is the market anomalous" state and turns
//! it into a position-sizing multiplier that external sizing code can consume
//! through a hook chain.

pub mod hooks;
pub mod manager;
pub mod state;

pub use hooks::{PositionSizer, PositionSizingHook, SizingContext};
pub use manager::{AdaptiveManager, AnalysisResult, AnalysisStatus, ExplainabilityEntry, ManagerStatus, RiskLevel};
pub use state::AnomalyState;

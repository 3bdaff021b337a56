pub mod adaptive;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod learners;
pub mod ml;
pub mod orchestrator;

pub use adaptive::{
    AdaptiveManager, AnalysisResult, AnalysisStatus, AnomalyState, PositionSizer,
    PositionSizingHook, RiskLevel, SizingContext,
};
pub use config::{AdaptiveManagerConfig, AppConfig, LoggingConfig, OrchestratorConfig};
pub use domain::{
    BacktestResult, MarketDataPoint, MarketRegime, MarketState, OptimizedStrategyParameters,
    ParameterBounds, StrategyAllocation, VersionStamp, VolatilityEnvironment,
};
pub use error::{AdaptiveError, Result};
pub use learners::{
    AllocationAgent, AnomalyDetector, AnomalySeverity, DetectionReport, ParameterOptimizer,
};
pub use orchestrator::{
    AdaptiveLearningManager, EvaluationReport, Learners, OrchestrationLogEntry,
    OrchestrationStatus, ProcessingSummary,
};

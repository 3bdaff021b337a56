//! Orchestration of the learners into always-available decisions.

pub mod artifacts;
pub mod audit;
pub mod learning_manager;
pub mod reward;
pub mod safe_mode;

pub use artifacts::ArtifactWriter;
pub use audit::{AuditLog, ComponentAvailability, OrchestrationLogEntry};
pub use learning_manager::{
    AdaptiveLearningManager, ComponentStatus, ComponentUpdate, EvaluationReport, Learners,
    OrchestrationStatus, ProcessingSummary, UpdateStatus, EVENT_ALLOCATION_REQUEST,
    EVENT_BACKTEST_COMPLETE, EVENT_MARKET_EVALUATION, EVENT_PARAMETER_REQUEST, GENERATED_BY,
};
pub use reward::{calculate_reward, reward_breakdown, RewardBreakdown, RewardWeights, REWARD_BOUND};
pub use safe_mode::{safe_mode_allocation, safe_mode_parameters, SAFE_MODE_ALLOCATION_CONFIDENCE};

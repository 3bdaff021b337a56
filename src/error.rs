use thiserror::Error;

/// Main error type for the adaptive learning layer
#[derive(Error, Debug)]
pub enum AdaptiveError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid weight for {strategy}: {weight} (must be within [0, 1])")]
    InvalidWeight { strategy: String, weight: f64 },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Learner errors (never surfaced past the orchestrator)
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Component failure: {component} - {reason}")]
    ComponentFailure { component: String, reason: String },

    // Position sizing hooks
    #[error("Position sizing hook failed: {0}")]
    Hook(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AdaptiveError {
    /// Shorthand for a learner failing inside its own computation.
    pub fn component(component: impl Into<String>, reason: impl Into<String>) -> Self {
        AdaptiveError::ComponentFailure {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller rather than by runtime data.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AdaptiveError::Config(_)
                | AdaptiveError::Validation(_)
                | AdaptiveError::InvalidWeight { .. }
        )
    }
}

/// Result type alias for AdaptiveError
pub type Result<T> = std::result::Result<T, AdaptiveError>;

//! Error types for the tidecast engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Error kinds surfaced by the engine.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model '{0}' has not been fitted; call fit() before predict()")]
    NotFitted(String),

    #[error("Numeric failure: {0}")]
    NumericFailure(String),

    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Optimizer did not converge: {0}")]
    NotConverged(String),
}

impl ForecastError {
    /// Stable error code for hosts that map errors onto a numeric channel.
    pub fn to_code(&self) -> i32 {
        match self {
            ForecastError::InvalidInput(_) => 1,
            ForecastError::NotFitted(_) => 2,
            ForecastError::NumericFailure(_) => 3,
            ForecastError::InsufficientData { .. } => 4,
            ForecastError::NotConverged(_) => 5,
        }
    }
}

//! Error types for bayes-mc

use thiserror::Error;

/// bayes-mc error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Array shape mismatch
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Invalid input or configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Numerical failure (singular matrix, non-finite result)
    #[error("Computation error: {0}")]
    Computation(String),

    /// Failure reported by the chain runner
    #[error("Sampler error: {0}")]
    Sampler(String),

    /// Plot backend failure
    #[error("Plot error: {0}")]
    Plot(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand for returning a validation error.
pub(crate) fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::Validation(msg.into()))
}

/// Reject a credible/confidence level outside (0, 1).
pub(crate) fn check_level(level: f64) -> Result<()> {
    if level > 0.0 && level < 1.0 {
        Ok(())
    } else {
        invalid(format!("level must lie in (0, 1), got {level}"))
    }
}

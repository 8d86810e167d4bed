//! Error and warning types for kriging operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for fitting and prediction.
///
/// Errors are `Clone` so a failed fit can be cached and replayed to every
/// caller that asks for the same dataset.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KrigingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data: {reason} (required {required}, found {found})")]
    InsufficientData {
        reason: &'static str,
        required: usize,
        found: usize,
    },

    #[error("Singular kriging system of dimension {dimension}")]
    SingularSystem { dimension: usize },

    #[error("CSV error: {0}")]
    Csv(String),
}

impl From<csv::Error> for KrigingError {
    fn from(e: csv::Error) -> Self {
        KrigingError::Csv(e.to_string())
    }
}

/// Result type alias for kriging operations
pub type Result<T> = std::result::Result<T, KrigingError>;

/// Non-fatal numerical conditions reported alongside a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NumericalWarning {
    /// The solved estimation variance was negative and has been clamped to 0.
    NegativeVarianceClamped { raw: f64 },
}

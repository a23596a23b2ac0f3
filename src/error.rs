// src/error.rs

//! Error types for the pricing pipeline.
//!
//! Solver statuses other than optimal are not errors: they come back from
//! `AtoModel::evaluate` as `f64::NAN` so batch pipelines can skip them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtoError {
    /// Malformed or dimensionally inconsistent store/run parameters.
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Incorrect number of prices: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{kind} '{name}' not found. Available: {available:?}")]
    NotFound {
        kind: &'static str,
        name: String,
        available: Vec<String>,
    },

    #[error("Metamodel regression failed: {reason}")]
    Regression { reason: String },

    #[error("Surrogate optimisation failed: {reason}")]
    Optimizer { reason: String },

    #[error("No grid point produced a defined response")]
    NoValidResponses,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl AtoError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        AtoError::Configuration {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AtoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_available_names() {
        let err = AtoError::NotFound {
            kind: "Distribution",
            name: "weibull".to_string(),
            available: vec!["default".to_string(), "poisson".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("weibull"));
        assert!(msg.contains("poisson"));
    }
}

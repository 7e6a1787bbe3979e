// src/error.rs

use thiserror::Error;

/// Errors raised by the adaptation algorithms.
///
/// None of these are recovered from at the point of detection. The
/// cross-validation selectors are the one place that inspects them: a
/// candidate dimension that fails with `InvalidDimension` is skipped there.
#[derive(Error, Debug)]
pub enum AdaptError {
    #[error("Requested dimension {requested} is outside the usable range 1..={max}.")]
    InvalidDimension { requested: usize, max: usize },

    #[error("Dimension mismatch for {context}: expected {expected}, found {found}.")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Linear algebra backend failure: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),
}

impl AdaptError {
    /// True for errors a hyperparameter sweep may skip over.
    pub fn is_invalid_dimension(&self) -> bool {
        matches!(self, AdaptError::InvalidDimension { .. })
    }
}

pub type Result<T> = std::result::Result<T, AdaptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = AdaptError::InvalidDimension { requested: 7, max: 3 };
        assert_eq!(
            err.to_string(),
            "Requested dimension 7 is outside the usable range 1..=3."
        );
        assert!(err.is_invalid_dimension());

        let err = AdaptError::DimensionMismatch {
            context: "target feature columns",
            expected: 4,
            found: 5,
        };
        assert!(err.to_string().contains("target feature columns"));
        assert!(!err.is_invalid_dimension());
    }
}

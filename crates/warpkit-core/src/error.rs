//! Error types for transform and resampling operations.
//!
//! Every failure in this crate is raised synchronously by the call that
//! detects it and is never retried internally.

use thiserror::Error;

/// Main error type for transform, composition and resampling operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Axis-role or rank mismatch.
    #[error("Shape mismatch: expected {expected}, got {actual:?}")]
    Shape {
        expected: String,
        actual: Vec<usize>,
    },

    /// Two batch sizes that are both larger than one and differ.
    #[error("Batch mismatch: expected {expected}, got {actual}")]
    BatchMismatch { expected: usize, actual: usize },

    /// Conflicting spatial dimensionality.
    #[error("Dimension mismatch: expected {expected}D, got {actual}D")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Non-invertible linear map.
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    /// Operation that is deliberately not available for this input.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Parameter rejected at construction time.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Tensor data could not be converted.
    #[error("Tensor data error: {0}")]
    Data(String),
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

impl TransformError {
    /// Create a shape error.
    pub fn shape(expected: impl Into<String>, actual: &[usize]) -> Self {
        Self::Shape {
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }

    /// Create a batch mismatch error.
    pub fn batch_mismatch(expected: usize, actual: usize) -> Self {
        Self::BatchMismatch { expected, actual }
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Create a singular matrix error.
    pub fn singular(msg: impl Into<String>) -> Self {
        Self::SingularMatrix(msg.into())
    }

    /// Create an unsupported operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a tensor data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TransformError::unsupported("nearest derivative");
        assert!(matches!(err, TransformError::Unsupported(_)));
    }

    #[test]
    fn test_error_display() {
        let err = TransformError::shape("[batch?, 3, ...]", &[2, 10, 10]);
        assert_eq!(
            err.to_string(),
            "Shape mismatch: expected [batch?, 3, ...], got [2, 10, 10]"
        );

        let err = TransformError::batch_mismatch(4, 3);
        assert_eq!(err.to_string(), "Batch mismatch: expected 4, got 3");

        let err = TransformError::dimension_mismatch(3, 2);
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3D, got 2D");
    }
}

//! Error types for numerical inversion.

use thiserror::Error;
use warpkit_core::TransformError;

/// Main error type for numerical inversion.
#[derive(Error, Debug)]
pub enum InverseError {
    /// Error raised by a core transform operation.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Invalid solver configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The transform cannot be inverted numerically.
    #[error("Unsupported transform: {0}")]
    UnsupportedTransform(String),
}

/// Result type for numerical inversion.
pub type Result<T> = std::result::Result<T, InverseError>;

impl InverseError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an unsupported transform error.
    pub fn unsupported_transform(msg: impl Into<String>) -> Self {
        Self::UnsupportedTransform(msg.into())
    }
}

impl From<InverseError> for TransformError {
    fn from(err: InverseError) -> Self {
        match err {
            InverseError::Transform(inner) => inner,
            InverseError::InvalidConfiguration(msg) => TransformError::invalid(msg),
            InverseError::UnsupportedTransform(msg) => TransformError::unsupported(msg),
        }
    }
}

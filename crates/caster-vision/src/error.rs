//! Error types for perception.

use thiserror::Error;

/// Result type for perception operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors that can occur while decoding or classifying frames.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Frame is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Invalid classification rule: {0}")]
    InvalidRule(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl VisionError {
    /// Create a malformed frame error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }

    /// Create an invalid rule error.
    pub fn invalid_rule(message: impl Into<String>) -> Self {
        Self::InvalidRule(message.into())
    }

    /// Errors that only mean "no signal this tick".
    pub fn is_classification_failure(&self) -> bool {
        matches!(
            self,
            VisionError::MalformedFrame(_) | VisionError::DimensionMismatch { .. }
        )
    }
}

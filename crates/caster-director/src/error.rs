//! Director error types.

use caster_models::SessionState;
use caster_vision::VisionError;
use thiserror::Error;

pub type DirectorResult<T> = Result<T, DirectorError>;

#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("Capture failed: {0}")]
    CaptureFailure(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("State {state} timed out after {elapsed:.1}s")]
    StateTimeout { state: SessionState, elapsed: f64 },

    #[error("Recovery exhausted in {state} after {retries} retries")]
    RecoveryExhausted { state: SessionState, retries: u32 },

    #[error("External action failed: {0}")]
    ExternalActionFailure(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DirectorError {
    pub fn capture_failure(msg: impl Into<String>) -> Self {
        Self::CaptureFailure(msg.into())
    }

    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification(msg.into())
    }

    pub fn action_failed(msg: impl Into<String>) -> Self {
        Self::ExternalActionFailure(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if the next tick is likely to succeed without intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            DirectorError::CaptureFailure(_)
            | DirectorError::Classification(_)
            | DirectorError::ExternalActionFailure(_) => true,
            DirectorError::Vision(e) => e.is_classification_failure(),
            _ => false,
        }
    }

    /// Check if the rest of the current tick must be skipped.
    ///
    /// Failed camera or scene commands are logged and the tick carries on.
    pub fn is_fatal_to_tick(&self) -> bool {
        !matches!(
            self,
            DirectorError::ExternalActionFailure(_) | DirectorError::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(DirectorError::capture_failure("timeout").is_transient());
        assert!(DirectorError::action_failed("camera").is_transient());
        assert!(DirectorError::from(VisionError::malformed("empty")).is_transient());
        assert!(!DirectorError::from(VisionError::invalid_rule("bad")).is_transient());
        assert!(!DirectorError::config_error("dwell").is_transient());
    }

    #[test]
    fn test_action_failures_do_not_abort_tick() {
        assert!(!DirectorError::action_failed("focus").is_fatal_to_tick());
        assert!(DirectorError::capture_failure("none").is_fatal_to_tick());
        assert!(DirectorError::classification("empty").is_fatal_to_tick());
    }

    #[test]
    fn test_error_messages() {
        let err = DirectorError::InvalidTransition {
            from: SessionState::Loading,
            to: SessionState::Spectating,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition from loading to spectating"
        );
    }
}

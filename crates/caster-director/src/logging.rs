//! Session-scoped structured logging.
//!
//! Lifecycle events and tick spans carry the session id and, once a match
//! has been found, the match id.

use caster_models::{MatchInfo, SessionId};
use tracing::{error, info, warn, Span};

use crate::session::Transition;

/// Placeholder match id while no match is being spectated.
const NO_MATCH: &str = "-";

/// Logger bound to one session.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    session_id: String,
    match_id: Option<String>,
}

impl SessionLogger {
    /// Logger for a session that is still looking for a match.
    pub fn idle(session_id: &SessionId) -> Self {
        Self {
            session_id: session_id.to_string(),
            match_id: None,
        }
    }

    /// Logger for a session spectating `info`.
    pub fn for_match(session_id: &SessionId, info: &MatchInfo) -> Self {
        Self {
            session_id: session_id.to_string(),
            match_id: Some(info.match_id.clone()),
        }
    }

    fn match_label(&self) -> &str {
        self.match_id.as_deref().unwrap_or(NO_MATCH)
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            match_id = %self.match_label(),
            "Session started: {}", message
        );
    }

    /// Log a lifecycle transition with its kind.
    pub fn log_transition(&self, transition: &Transition) {
        info!(
            session_id = %self.session_id,
            match_id = %self.match_label(),
            from = %transition.from,
            to = %transition.to,
            kind = ?transition.kind,
            "Session {} -> {}", transition.from, transition.to
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            match_id = %self.match_label(),
            "Session warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session_id = %self.session_id,
            match_id = %self.match_label(),
            "Session error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            match_id = %self.match_label(),
            "Session completed: {}", message
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn match_id(&self) -> Option<&str> {
        self.match_id.as_deref()
    }

    /// Span for one director tick within this session.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "session",
            session_id = %self.session_id,
            match_id = %self.match_label()
        )
    }
}

//! Session lifecycle states and their transition tables.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a spectating session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The match a session found and is spectating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchInfo {
    /// Identifier reported by the match probe
    pub match_id: String,
    /// Window hosting the game client
    pub window_name: String,
    /// When the match was found
    pub found_at: DateTime<Utc>,
}

impl MatchInfo {
    pub fn new(match_id: impl Into<String>, window_name: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            window_name: window_name.into(),
            found_at: Utc::now(),
        }
    }
}

/// Session lifecycle state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Process start, configuration checks
    #[default]
    Initializing,
    /// Looking for a match to spectate
    FindingTarget,
    /// Match found, switching to its window
    TargetFound,
    /// Waiting for the match to load
    Loading,
    /// Preparing the in-game view
    SettingUpView,
    /// Actively directing the camera
    Spectating,
    /// Match over
    Ended,
    /// Recovery exhausted; waiting for hard recovery
    Error,
}

impl SessionState {
    /// All states.
    pub const ALL: &'static [SessionState] = &[
        SessionState::Initializing,
        SessionState::FindingTarget,
        SessionState::TargetFound,
        SessionState::Loading,
        SessionState::SettingUpView,
        SessionState::Spectating,
        SessionState::Ended,
        SessionState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::FindingTarget => "finding_target",
            SessionState::TargetFound => "target_found",
            SessionState::Loading => "loading",
            SessionState::SettingUpView => "setting_up_view",
            SessionState::Spectating => "spectating",
            SessionState::Ended => "ended",
            SessionState::Error => "error",
        }
    }

    /// Declared forward/escalation edges out of this state.
    pub fn legal_targets(&self) -> &'static [SessionState] {
        use SessionState::*;
        match self {
            Initializing => &[FindingTarget, Error],
            FindingTarget => &[TargetFound, Error],
            TargetFound => &[Loading, Error],
            Loading => &[SettingUpView, Error],
            SettingUpView => &[Spectating, Error],
            Spectating => &[Ended, Error],
            Ended => &[FindingTarget, Error],
            Error => &[FindingTarget],
        }
    }

    /// Returns true if `to` is a declared edge from this state.
    pub fn can_transition_to(&self, to: SessionState) -> bool {
        self.legal_targets().contains(&to)
    }

    /// State entered when this state times out with retries left.
    ///
    /// `None` for `Error`, which only leaves through hard recovery.
    pub fn recovery_target(&self) -> Option<SessionState> {
        use SessionState::*;
        match self {
            Initializing => Some(Initializing),
            FindingTarget => Some(FindingTarget),
            TargetFound => Some(TargetFound),
            Loading => Some(FindingTarget),
            SettingUpView => Some(Loading),
            Spectating => Some(Ended),
            Ended => Some(FindingTarget),
            Error => None,
        }
    }

    /// The camera pipeline only runs while spectating.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Spectating)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

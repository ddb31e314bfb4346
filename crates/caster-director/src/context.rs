//! Session-scoped context and clock.

use caster_models::{MatchInfo, SessionId};
use tokio::time::Instant;

use crate::logging::SessionLogger;

/// Converts instants into seconds since a fixed start.
///
/// Built on `tokio::time::Instant` so paused-clock tests advance it.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    /// Start a clock at the current instant.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds elapsed since the clock started.
    pub fn now(&self) -> f64 {
        self.seconds_at(Instant::now())
    }

    /// Session seconds at `instant`; zero for instants before the start.
    pub fn seconds_at(&self, instant: Instant) -> f64 {
        instant.saturating_duration_since(self.start).as_secs_f64()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::start()
    }
}

/// Everything scoped to one spectated match.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub match_info: Option<MatchInfo>,
    pub clock: SessionClock,
    pub logger: SessionLogger,
}

impl SessionContext {
    /// Context for a director that has not found a match yet.
    pub fn idle() -> Self {
        let session_id = SessionId::new();
        let logger = SessionLogger::idle(&session_id);
        Self {
            session_id,
            match_info: None,
            clock: SessionClock::start(),
            logger,
        }
    }

    /// Start a fresh session for `info`; the clock restarts at zero.
    pub fn begin_match(&mut self, info: MatchInfo) {
        self.session_id = SessionId::new();
        self.logger = SessionLogger::for_match(&self.session_id, &info);
        self.clock = SessionClock::start();
        self.logger.log_start(&format!(
            "match {} in window '{}'",
            info.match_id, info.window_name
        ));
        self.match_info = Some(info);
    }

    /// Close the current session.
    pub fn end_match(&mut self) {
        if let Some(info) = self.match_info.take() {
            self.logger.log_completion(&format!(
                "match {} after {:.0}s",
                info.match_id,
                self.clock.now()
            ));
        }
    }

    /// Window the current match lives in.
    pub fn window_name(&self) -> Option<&str> {
        self.match_info.as_ref().map(|m| m.window_name.as_str())
    }
}

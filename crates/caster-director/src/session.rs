//! Session controller.
//!
//! Owns the session lifecycle state. Every transition is validated against
//! the declared edge table; each state carries a timeout and a retry budget
//! whose exhaustion escalates to `Error`.

use std::collections::{BTreeMap, VecDeque};

use caster_models::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{DirectorError, DirectorResult};
use crate::metrics;

/// Timeout and retry budget of one state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatePolicy {
    /// Seconds the state may last before it times out
    pub timeout_secs: f64,
    /// Timeouts tolerated before escalating to `Error`
    pub max_retries: u32,
}

impl StatePolicy {
    pub fn new(timeout_secs: f64, max_retries: u32) -> Self {
        Self {
            timeout_secs,
            max_retries,
        }
    }
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-state policies; `Error` has none and never times out
    pub policies: BTreeMap<SessionState, StatePolicy>,
    /// Transitions kept for diagnostics (default: 64)
    pub history_capacity: usize,
    /// Bound on the hard-recovery callback (default: 30000)
    pub hard_recovery_timeout_ms: u64,
    /// Stream scene shown in each state
    pub scenes: BTreeMap<SessionState, String>,
    /// Retries for a failed scene switch (default: 2)
    pub scene_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        use SessionState::*;

        let policies = [
            (Initializing, StatePolicy::new(30.0, 3)),
            (FindingTarget, StatePolicy::new(60.0, 3)),
            (TargetFound, StatePolicy::new(15.0, 3)),
            (Loading, StatePolicy::new(180.0, 3)),
            (SettingUpView, StatePolicy::new(30.0, 3)),
            (Spectating, StatePolicy::new(5400.0, 3)),
            (Ended, StatePolicy::new(20.0, 3)),
        ]
        .into_iter()
        .collect();

        let scenes = [
            (Initializing, "starting"),
            (FindingTarget, "intermission"),
            (TargetFound, "intermission"),
            (Loading, "intermission"),
            (SettingUpView, "intermission"),
            (Spectating, "live"),
            (Ended, "intermission"),
            (Error, "technical_difficulties"),
        ]
        .into_iter()
        .map(|(state, scene)| (state, scene.to_string()))
        .collect();

        Self {
            policies,
            history_capacity: 64,
            hard_recovery_timeout_ms: 30_000,
            scenes,
            scene_retries: 2,
        }
    }
}

impl SessionConfig {
    pub fn policy(&self, state: SessionState) -> Option<StatePolicy> {
        self.policies.get(&state).copied()
    }

    /// Override one state's policy.
    pub fn with_policy(mut self, state: SessionState, policy: StatePolicy) -> Self {
        self.policies.insert(state, policy);
        self
    }

    /// Validation errors as human-readable strings.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for state in SessionState::ALL {
            if *state == SessionState::Error {
                continue;
            }
            match self.policy(*state) {
                Some(p) if p.timeout_secs > 0.0 && p.max_retries > 0 => {}
                Some(_) => problems.push(format!(
                    "{} needs a positive timeout and at least one retry",
                    state
                )),
                None => problems.push(format!("{} has no timeout policy", state)),
            }
        }
        if self.policies.contains_key(&SessionState::Error) {
            problems.push("error state cannot time out".to_string());
        }
        problems
    }
}

/// How a transition came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Requested along a declared edge
    Forward,
    /// Timeout moved the session along the recovery table
    Recovery,
    /// Timeout restarted the state's timer in place
    Rearm,
    /// Retry budget exhausted
    Escalation,
    /// `Error` left through hard recovery
    HardRecovery,
}

/// One entry of the transition history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub kind: TransitionKind,
    /// Director uptime in seconds
    pub at: f64,
    /// Wall-clock time of the transition
    pub recorded_at: DateTime<Utc>,
}

/// Finite-state machine for the session lifecycle.
#[derive(Debug)]
pub struct SessionController {
    config: SessionConfig,
    state: SessionState,
    entered_at: f64,
    retries: BTreeMap<SessionState, u32>,
    history: VecDeque<Transition>,
}

impl SessionController {
    /// Create a controller in `Initializing` at time `now`.
    pub fn new(config: SessionConfig, now: f64) -> Self {
        Self {
            config,
            state: SessionState::Initializing,
            entered_at: now,
            retries: BTreeMap::new(),
            history: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Seconds spent in the current state (since entry or last re-arm).
    pub fn time_in_state(&self, now: f64) -> f64 {
        now - self.entered_at
    }

    /// Timeouts counted against `state` so far.
    pub fn retries(&self, state: SessionState) -> u32 {
        self.retries.get(&state).copied().unwrap_or(0)
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Transition> {
        self.history.iter()
    }

    /// Request a move along a declared edge.
    ///
    /// A forward move resets both the exited and the entered state's retry
    /// counter. Illegal requests leave the state unchanged.
    pub fn request(&mut self, to: SessionState, now: f64) -> DirectorResult<Transition> {
        let from = self.state;
        if !from.can_transition_to(to) {
            warn!("Rejected session transition {} -> {}", from, to);
            return Err(DirectorError::InvalidTransition { from, to });
        }

        if from == SessionState::Error {
            self.retries.clear();
            return Ok(self.enter(to, TransitionKind::HardRecovery, now));
        }

        let kind = if to == SessionState::Error {
            TransitionKind::Escalation
        } else {
            self.retries.remove(&from);
            self.retries.remove(&to);
            TransitionKind::Forward
        };
        Ok(self.enter(to, kind, now))
    }

    /// Whether the current state has outlived its timeout.
    pub fn is_timed_out(&self, now: f64) -> bool {
        self.config
            .policy(self.state)
            .is_some_and(|p| self.time_in_state(now) > p.timeout_secs)
    }

    /// Handle a timeout of the current state if one is due.
    pub fn check_timeout(&mut self, now: f64) -> DirectorResult<Option<Transition>> {
        if !self.is_timed_out(now) {
            return Ok(None);
        }
        self.handle_timeout(now).map(Some)
    }

    /// Count a timeout against the current state and react to it.
    ///
    /// With retries left the session follows the recovery table (or re-arms
    /// in place); once the budget is spent it moves to `Error` and
    /// `RecoveryExhausted` is returned. A timeout in `Error` is invalid.
    pub fn handle_timeout(&mut self, now: f64) -> DirectorResult<Transition> {
        let state = self.state;
        let (Some(policy), Some(target)) = (self.config.policy(state), state.recovery_target())
        else {
            warn!("Timeout is not a valid transition out of {}", state);
            return Err(DirectorError::InvalidTransition {
                from: state,
                to: SessionState::Error,
            });
        };

        let elapsed = self.time_in_state(now);
        let count = self.retries.entry(state).or_insert(0);
        *count += 1;
        let retries = *count;
        warn!(
            "{} (retry {}/{})",
            DirectorError::StateTimeout { state, elapsed },
            retries,
            policy.max_retries
        );

        if retries >= policy.max_retries {
            let err = DirectorError::RecoveryExhausted { state, retries };
            error!("{}", err);
            self.enter(SessionState::Error, TransitionKind::Escalation, now);
            return Err(err);
        }

        let kind = if target == state {
            TransitionKind::Rearm
        } else {
            TransitionKind::Recovery
        };
        Ok(self.enter(target, kind, now))
    }

    /// Leave `Error` for `FindingTarget`, resetting every retry counter.
    ///
    /// The caller runs the hard-recovery callback first.
    pub fn recover(&mut self, now: f64) -> DirectorResult<Transition> {
        if self.state != SessionState::Error {
            return Err(DirectorError::InvalidTransition {
                from: self.state,
                to: SessionState::FindingTarget,
            });
        }
        self.request(SessionState::FindingTarget, now)
    }

    fn enter(&mut self, to: SessionState, kind: TransitionKind, now: f64) -> Transition {
        let transition = Transition {
            from: self.state,
            to,
            kind,
            at: now,
            recorded_at: Utc::now(),
        };
        self.state = to;
        self.entered_at = now;

        if self.history.len() >= self.config.history_capacity.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(transition);

        if kind != TransitionKind::Rearm {
            metrics::record_state_transition(transition.from, to);
            info!("Session state {} -> {} ({:?})", transition.from, to, kind);
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    fn controller() -> SessionController {
        SessionController::new(SessionConfig::default(), 0.0)
    }

    fn drive_to(controller: &mut SessionController, path: &[SessionState]) {
        for (i, state) in path.iter().enumerate() {
            controller.request(*state, i as f64).unwrap();
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(SessionConfig::default().problems().is_empty());
    }

    #[test]
    fn test_happy_path() {
        let mut c = controller();
        drive_to(
            &mut c,
            &[FindingTarget, TargetFound, Loading, SettingUpView, Spectating, Ended, FindingTarget],
        );
        assert_eq!(c.state(), FindingTarget);
        assert_eq!(c.history().count(), 7);
        assert!(c.history().all(|t| t.kind == TransitionKind::Forward));
    }

    #[test]
    fn test_only_declared_edges_succeed() {
        for from in SessionState::ALL {
            for to in SessionState::ALL {
                let mut c = controller();
                c.state = *from;
                let result = c.request(*to, 1.0);
                assert_eq!(result.is_ok(), from.can_transition_to(*to), "{from} -> {to}");
                if result.is_err() {
                    assert_eq!(c.state(), *from);
                }
            }
        }
    }

    #[test]
    fn test_timeouts_escalate_to_error() {
        let config = SessionConfig::default().with_policy(FindingTarget, StatePolicy::new(5.0, 3));
        let mut c = SessionController::new(config, 0.0);
        c.request(FindingTarget, 0.0).unwrap();

        for i in 1..=2 {
            let t = c.handle_timeout(i as f64 * 6.0).unwrap();
            assert_eq!(t.kind, TransitionKind::Rearm);
            assert_eq!(c.state(), FindingTarget);
            assert_eq!(c.retries(FindingTarget), i);
        }

        let err = c.handle_timeout(18.0).unwrap_err();
        assert!(matches!(err, DirectorError::RecoveryExhausted { retries: 3, .. }));
        assert_eq!(c.state(), Error);

        let err = c.handle_timeout(24.0).unwrap_err();
        assert!(matches!(err, DirectorError::InvalidTransition { from: Error, .. }));
        assert_eq!(c.state(), Error);
    }

    #[test]
    fn test_recovery_table_and_counters() {
        let mut c = controller();
        drive_to(&mut c, &[FindingTarget, TargetFound, Loading, SettingUpView]);

        let t = c.handle_timeout(100.0).unwrap();
        assert_eq!((t.to, t.kind), (Loading, TransitionKind::Recovery));
        assert_eq!(c.retries(SettingUpView), 1);

        let t = c.handle_timeout(300.0).unwrap();
        assert_eq!(t.to, FindingTarget);
        assert_eq!(c.retries(Loading), 1);

        // A successful forward exit resets the exited state's counter.
        c.request(TargetFound, 301.0).unwrap();
        assert_eq!(c.retries(FindingTarget), 0);
        c.request(Loading, 302.0).unwrap();
        assert_eq!(c.retries(Loading), 0);
        assert_eq!(c.retries(SettingUpView), 1);
    }

    #[test]
    fn test_spectating_timeout_ends_game() {
        let mut c = controller();
        drive_to(
            &mut c,
            &[FindingTarget, TargetFound, Loading, SettingUpView, Spectating],
        );
        let t = c.handle_timeout(10_000.0).unwrap();
        assert_eq!(t.to, Ended);
    }

    #[test]
    fn test_check_timeout_waits_for_deadline() {
        let config = SessionConfig::default().with_policy(Initializing, StatePolicy::new(10.0, 3));
        let mut c = SessionController::new(config, 0.0);

        assert!(c.check_timeout(9.0).unwrap().is_none());
        let t = c.check_timeout(10.5).unwrap().unwrap();
        assert_eq!(t.kind, TransitionKind::Rearm);
        // Re-armed: the timer restarted.
        assert!(c.check_timeout(15.0).unwrap().is_none());
    }

    #[test]
    fn test_recover_resets_all_counters() {
        let config = SessionConfig::default().with_policy(FindingTarget, StatePolicy::new(1.0, 1));
        let mut c = SessionController::new(config, 0.0);
        c.request(FindingTarget, 0.0).unwrap();
        assert!(c.handle_timeout(2.0).is_err());
        assert_eq!(c.state(), Error);

        let t = c.recover(3.0).unwrap();
        assert_eq!((t.from, t.to, t.kind), (Error, FindingTarget, TransitionKind::HardRecovery));
        assert_eq!(c.retries(FindingTarget), 0);
        assert!(c.recover(4.0).is_err());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = SessionConfig {
            history_capacity: 3,
            ..Default::default()
        };
        let mut c = SessionController::new(config, 0.0);
        drive_to(&mut c, &[FindingTarget, TargetFound, Loading, SettingUpView]);

        let kept: Vec<SessionState> = c.history().map(|t| t.to).collect();
        assert_eq!(kept, vec![TargetFound, Loading, SettingUpView]);
    }
}

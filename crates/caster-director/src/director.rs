//! The director tick loop.
//!
//! One logical tick per period: handle state timeouts, then run the current
//! state's step. While spectating that step is capture, territory and
//! activity update, scheduling and camera actuation. Failures end the tick,
//! are logged with repeat suppression, and are followed by a backoff that
//! shutdown can interrupt. Failed external actions are logged without
//! backoff. A game restart runs as its own task and is polled by later
//! ticks. Nothing escapes the loop.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use caster_models::{PriorityClass, Rect, SessionState, TerritorySnapshot, ViewTarget};
use caster_vision::{ActivityDetector, Frame, PresenceExtractor, TerritoryModel, TerritoryUpdate};
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

use crate::candidates;
use crate::capture::{CaptureWorker, FrameReceiver};
use crate::config::DirectorConfig;
use crate::context::{SessionClock, SessionContext};
use crate::error::{DirectorError, DirectorResult};
use crate::metrics;
use crate::observers::{spawn_observers, SnapshotReceiver};
use crate::ports::Collaborators;
use crate::retry::{retry_async, FailureTracker, RetryConfig};
use crate::scheduler::ViewScheduler;
use crate::session::{SessionController, Transition, TransitionKind};

/// Drives the session lifecycle and the camera.
pub struct Director {
    config: DirectorConfig,
    ports: Collaborators,
    controller: SessionController,
    territory: TerritoryModel,
    activity: ActivityDetector,
    scheduler: ViewScheduler,
    ctx: SessionContext,
    /// Director uptime; drives state timeouts
    uptime: SessionClock,
    snapshots: watch::Sender<Arc<TerritorySnapshot>>,
    shutdown: watch::Receiver<bool>,
    previous_frame: Option<Arc<Frame>>,
    last_target: Option<u64>,
    current_scene: Option<String>,
    failures: FailureTracker,
    action_failures: FailureTracker,
    backoff: RetryConfig,
    /// Pending game restart; `None` when it timed out
    restart: Option<JoinHandle<Option<bool>>>,
}

impl Director {
    /// Build a director; the loop stops once `shutdown` turns true.
    pub fn new(
        config: DirectorConfig,
        ports: Collaborators,
        shutdown: watch::Receiver<bool>,
    ) -> DirectorResult<Self> {
        config.validate()?;

        let uptime = SessionClock::start();
        let territory = TerritoryModel::new(
            config.territory.clone(),
            PresenceExtractor::new(config.factions.clone()),
        );
        let scheduler =
            ViewScheduler::new(config.scheduler.clone(), config.capture.playable_region());
        let (snapshots, _) = watch::channel(Arc::new(TerritorySnapshot::empty()));
        let backoff = RetryConfig::new("tick")
            .with_base_delay(Duration::from_millis(config.tick.backoff_base_ms))
            .with_max_delay(Duration::from_millis(config.tick.backoff_max_ms));

        Ok(Self {
            controller: SessionController::new(config.session.clone(), uptime.now()),
            activity: ActivityDetector::new(config.activity.clone()),
            failures: FailureTracker::new(config.tick.max_logged_failures),
            action_failures: FailureTracker::new(config.tick.max_logged_failures),
            territory,
            scheduler,
            ctx: SessionContext::idle(),
            uptime,
            snapshots,
            shutdown,
            previous_frame: None,
            last_target: None,
            current_scene: None,
            backoff,
            restart: None,
            ports,
            config,
        })
    }

    /// Replace the scheduler's RNG (seeded in tests).
    pub fn with_scheduler_rng(mut self, rng: StdRng) -> Self {
        self.scheduler = ViewScheduler::with_rng(
            self.config.scheduler.clone(),
            self.config.capture.playable_region(),
            rng,
        );
        self
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// The camera target currently held by the scheduler.
    pub fn current_view(&self) -> Option<ViewTarget> {
        self.scheduler.current()
    }

    /// Follow territory snapshots as they are published.
    pub fn subscribe_snapshots(&self) -> SnapshotReceiver {
        self.snapshots.subscribe()
    }

    /// Run until shutdown.
    pub async fn run(&mut self) -> DirectorResult<()> {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            info!("Shutdown requested before the director started");
            return Ok(());
        }

        let (mut frames, capture) = CaptureWorker::spawn(
            self.ports.frames.clone(),
            self.config.capture.clone(),
            self.config.tick.max_logged_failures,
            shutdown.clone(),
        );
        let observers = spawn_observers(
            &self.config.observers,
            &self.snapshots.subscribe(),
            &shutdown,
        );

        self.ctx.logger.log_start(&format!(
            "director loop every {}ms",
            self.config.tick.period_ms
        ));
        self.switch_scene(self.controller.state()).await;

        let mut ticker = interval(self.config.tick.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    ticks += 1;
                    let started = Instant::now();
                    // One span per tick so events carry the current session.
                    let span = self.ctx.logger.create_span();
                    match self.tick(&mut frames).instrument(span).await {
                        Ok(()) => {
                            self.failures.record_success();
                            self.action_failures.record_success();
                            metrics::record_tick(started.elapsed().as_secs_f64());
                        }
                        Err(e) if !e.is_fatal_to_tick() => {
                            if self.action_failures.record_failure() {
                                warn!(
                                    state = %self.controller.state(),
                                    "Tick {}: {}", ticks, e
                                );
                            }
                        }
                        Err(e) => {
                            metrics::record_tick_failure();
                            let log = self.failures.record_failure();
                            if !e.is_transient() {
                                error!(
                                    state = %self.controller.state(),
                                    "Tick {} failed: {}", ticks, e
                                );
                            } else if log {
                                warn!(
                                    state = %self.controller.state(),
                                    "Tick {} failed: {}", ticks, e
                                );
                            }
                            let attempt = self.failures.failure_count().saturating_sub(1);
                            let delay = self.backoff.delay_for_attempt(attempt);
                            tokio::select! {
                                changed = shutdown.changed() => {
                                    if changed.is_err() || *shutdown.borrow() {
                                        break;
                                    }
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }
        }

        capture.abort();
        if let Some(restart) = self.restart.take() {
            restart.abort();
        }
        for handle in observers {
            handle.abort();
        }
        self.ctx.end_match();
        self.ctx.logger.log_completion(&format!(
            "director stopped after {} ticks in {}",
            ticks,
            self.controller.state()
        ));
        Ok(())
    }

    async fn tick(&mut self, frames: &mut FrameReceiver) -> DirectorResult<()> {
        let now = self.uptime.now();
        match self.controller.check_timeout(now) {
            Ok(Some(transition)) => self.on_transition(transition).await,
            Ok(None) => {}
            Err(DirectorError::RecoveryExhausted { .. }) => {
                self.switch_scene(SessionState::Error).await;
            }
            Err(e) => return Err(e),
        }

        match self.controller.state() {
            SessionState::Initializing => self.advance(SessionState::FindingTarget, now).await,
            SessionState::FindingTarget => {
                let probe = self.ports.probe.clone();
                if let Some(info) = self.bounded(probe.find_match()).await.flatten() {
                    self.ctx.begin_match(info);
                    self.advance(SessionState::TargetFound, now).await?;
                }
                Ok(())
            }
            SessionState::TargetFound => {
                let Some(name) = self.ctx.window_name().map(str::to_string) else {
                    return Err(DirectorError::action_failed("no match window to focus"));
                };
                let window = self.ports.window.clone();
                match self.bounded(window.switch_to(&name)).await {
                    Some(true) => self.advance(SessionState::Loading, now).await,
                    Some(false) => Err(DirectorError::action_failed(format!(
                        "could not focus window '{name}'"
                    ))),
                    None => Err(DirectorError::action_failed(format!(
                        "focusing window '{name}' timed out"
                    ))),
                }
            }
            SessionState::Loading => {
                let probe = self.ports.probe.clone();
                if self.bounded(probe.load_complete()).await == Some(true) {
                    self.advance(SessionState::SettingUpView, now).await?;
                }
                Ok(())
            }
            SessionState::SettingUpView => {
                let probe = self.ports.probe.clone();
                if self.bounded(probe.view_ready()).await == Some(true) {
                    self.reset_match_state();
                    self.advance(SessionState::Spectating, now).await?;
                }
                Ok(())
            }
            SessionState::Spectating => self.spectate(frames, now).await,
            SessionState::Ended => {
                self.reset_match_state();
                self.ctx.end_match();
                self.advance(SessionState::FindingTarget, now).await
            }
            SessionState::Error => self.hard_recovery().await,
        }
    }

    async fn spectate(&mut self, frames: &mut FrameReceiver, now: f64) -> DirectorResult<()> {
        let frame = self.next_frame(frames).await?;
        let session_now = self.ctx.clock.now();
        self.fit_region(&frame);

        match self.territory.update(&frame, session_now) {
            Ok(TerritoryUpdate::Recomputed) => self.publish_snapshot(session_now),
            Ok(TerritoryUpdate::Cached) => {}
            Err(e) if e.is_classification_failure() => {
                return Err(DirectorError::classification(e.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        let probe = self.ports.probe.clone();
        if self.bounded(probe.game_over(&frame)).await == Some(true) {
            info!("Game over detected");
            return self.advance(SessionState::Ended, now).await;
        }

        let zones = self
            .activity
            .detect(self.previous_frame.as_deref(), &frame, session_now);
        self.previous_frame = Some(frame);

        let snapshot = self.snapshots.borrow().clone();
        let candidates = candidates::gather(&snapshot, &zones);
        debug!(
            "Tick at {:.1}s: {} candidates ({} activity zones, {} conflicts)",
            session_now,
            candidates.len(),
            zones.len(),
            snapshot.conflicts.len()
        );

        let Some(target) = self.scheduler.next_view(&candidates, session_now) else {
            return Ok(());
        };
        if self.last_target == Some(target.id) {
            return Ok(());
        }
        self.last_target = Some(target.id);
        metrics::record_view_change(target.priority_class);
        info!(
            "View -> ({:.0}, {:.0}) {} importance {:.2}{}",
            target.position.x,
            target.position.y,
            target.priority_class,
            target.importance,
            if target.forced { " (forced)" } else { "" }
        );

        if let Err(e) = self.actuate(&target).await {
            warn!("Camera command failed: {}", e);
        }
        Ok(())
    }

    /// Wait a bounded time for a frame newer than the last one used.
    async fn next_frame(&self, frames: &mut FrameReceiver) -> DirectorResult<Arc<Frame>> {
        let wait = self.config.tick.frame_wait();
        match timeout(wait, frames.changed()).await {
            Ok(Ok(())) => frames
                .borrow_and_update()
                .clone()
                .ok_or_else(|| DirectorError::capture_failure("no frame captured yet")),
            Ok(Err(_)) => Err(DirectorError::capture_failure("capture worker stopped")),
            Err(_) => Err(DirectorError::capture_failure(format!(
                "no new frame within {}ms",
                wait.as_millis()
            ))),
        }
    }

    /// Follow a change in capture size: new playable region, fresh territory.
    fn fit_region(&mut self, frame: &Frame) {
        let bounds = self.scheduler.region().bounds;
        if bounds.width == frame.width() as f64 && bounds.height == frame.height() as f64 {
            return;
        }
        info!(
            "Frame size changed to {}x{}; resetting territory",
            frame.width(),
            frame.height()
        );
        self.scheduler.set_region(
            self.config
                .capture
                .playable_region_for(frame.width(), frame.height()),
        );
        self.territory.clear();
        self.previous_frame = None;
    }

    fn publish_snapshot(&mut self, session_now: f64) {
        let snapshot = Arc::new(self.territory.snapshot(session_now));
        metrics::set_active_conflicts(snapshot.conflicts.len());
        self.snapshots.send_replace(snapshot);
    }

    fn reset_match_state(&mut self) {
        self.territory.clear();
        self.scheduler.reset();
        self.previous_frame = None;
        self.last_target = None;
        self.snapshots
            .send_replace(Arc::new(TerritorySnapshot::empty()));
        metrics::set_active_conflicts(0);
    }

    /// Focus the target; raids are additionally followed inside a box.
    async fn actuate(&self, target: &ViewTarget) -> DirectorResult<()> {
        let camera = self.ports.camera.clone();
        let bound = self.config.tick.action_timeout();

        timeout(bound, camera.focus(target.position))
            .await
            .map_err(|_| DirectorError::action_failed("camera focus timed out"))??;

        if matches!(
            target.priority_class,
            PriorityClass::Critical | PriorityClass::Raid
        ) {
            let rect = Rect::centered(
                target.position,
                self.config.camera.follow_width,
                self.config.camera.follow_height,
            )
            .clamp_within(&self.scheduler.region().bounds);
            timeout(bound, camera.drag_follow(rect))
                .await
                .map_err(|_| DirectorError::action_failed("camera follow timed out"))??;
        }
        Ok(())
    }

    /// Start the game restart, or finish recovery once it is done.
    async fn hard_recovery(&mut self) -> DirectorResult<()> {
        let bound = Duration::from_millis(self.config.session.hard_recovery_timeout_ms);
        let outcome = match self.restart.take() {
            None => {
                self.ctx.logger.log_error("recovery exhausted, restarting the game");
                let lifecycle = self.ports.lifecycle.clone();
                self.restart = Some(tokio::spawn(async move {
                    timeout(bound, lifecycle.restart()).await.ok()
                }));
                return Ok(());
            }
            Some(handle) if !handle.is_finished() => {
                self.restart = Some(handle);
                return Ok(());
            }
            Some(handle) => handle.await,
        };

        match outcome {
            Ok(Some(true)) => info!("Hard recovery completed"),
            Ok(Some(false)) => warn!("Hard recovery reported failure"),
            Ok(None) => warn!("Hard recovery timed out after {}ms", bound.as_millis()),
            Err(e) => warn!("Hard recovery task failed: {}", e),
        }

        self.reset_match_state();
        self.ctx.end_match();
        let transition = self.controller.recover(self.uptime.now())?;
        self.on_transition(transition).await;
        Ok(())
    }

    async fn advance(&mut self, to: SessionState, now: f64) -> DirectorResult<()> {
        let transition = self.controller.request(to, now)?;
        self.on_transition(transition).await;
        Ok(())
    }

    async fn on_transition(&mut self, transition: Transition) {
        if transition.kind == TransitionKind::Rearm {
            return;
        }
        self.ctx.logger.log_transition(&transition);
        self.switch_scene(transition.to).await;
    }

    /// Show the scene mapped to `state`, if it differs from the current one.
    async fn switch_scene(&mut self, state: SessionState) {
        let Some(scene) = self.config.session.scenes.get(&state).cloned() else {
            return;
        };
        if self.current_scene.as_deref() == Some(scene.as_str()) {
            return;
        }

        let port = self.ports.scene.clone();
        let bound = self.config.tick.action_timeout();
        let retry = RetryConfig::new("scene_switch")
            .with_max_retries(self.config.session.scene_retries);
        let result = retry_async(&retry, || {
            let port = port.clone();
            let scene = scene.clone();
            async move {
                match timeout(bound, port.switch(&scene)).await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(DirectorError::action_failed(format!(
                        "scene '{scene}' rejected"
                    ))),
                    Err(_) => Err(DirectorError::action_failed(format!(
                        "scene '{scene}' timed out"
                    ))),
                }
            }
        })
        .await;

        match result.into_result() {
            Ok(()) => {
                info!("Stream scene -> {}", scene);
                self.current_scene = Some(scene);
            }
            Err(e) => self
                .ctx
                .logger
                .log_warning(&format!("scene switch to '{scene}' failed: {e}")),
        }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        timeout(self.config.tick.action_timeout(), fut).await.ok()
    }
}

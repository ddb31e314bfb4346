//! Director loop tests against scripted collaborators.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use caster_director::{
    CameraActuator, Collaborators, Director, DirectorConfig, DirectorError, DirectorResult,
    FrameSource, MatchProbe, ProcessLifecycle, StatePolicy, StreamScene, TransitionKind,
    WindowFocus,
};
use caster_models::{Faction, MatchInfo, Point, Rect, SessionState};
use caster_vision::Frame;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Fails the first `failures` captures, then cycles a white block through
/// three places.
struct ScriptedFrames {
    calls: AtomicU32,
    failures: u32,
}

#[async_trait]
impl FrameSource for ScriptedFrames {
    async fn capture(&self, _region: Rect) -> DirectorResult<Option<Frame>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return if n % 2 == 0 {
                Ok(None)
            } else {
                Err(DirectorError::capture_failure("device lost"))
            };
        }
        let (x, y) = match n % 3 {
            0 => (20, 20),
            1 => (60, 40),
            _ => (40, 70),
        };
        let mut frame = Frame::filled(100, 100, [0, 0, 0]);
        frame.paint(x, y, 8, 8, [255, 255, 255]);
        Ok(Some(frame))
    }
}

/// Two overlapping faction blocks, identical every capture.
struct TerritoryFrames;

#[async_trait]
impl FrameSource for TerritoryFrames {
    async fn capture(&self, _region: Rect) -> DirectorResult<Option<Frame>> {
        let mut frame = Frame::filled(100, 100, [0, 0, 0]);
        frame.paint(5, 5, 40, 40, Faction::Red.display_rgb());
        frame.paint(38, 38, 40, 40, Faction::Blue.display_rgb());
        Ok(Some(frame))
    }
}

#[derive(Default)]
struct FakeCamera {
    focus: AtomicU32,
    broken: bool,
}

#[async_trait]
impl CameraActuator for FakeCamera {
    async fn focus(&self, _position: Point) -> DirectorResult<()> {
        self.focus.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(DirectorError::action_failed("input device unplugged"));
        }
        Ok(())
    }

    async fn drag_follow(&self, _rect: Rect) -> DirectorResult<()> {
        Ok(())
    }
}

struct FakeWindow;

#[async_trait]
impl WindowFocus for FakeWindow {
    async fn switch_to(&self, _name: &str) -> bool {
        true
    }
}

/// Refuses focus a fixed number of times.
struct FlakyWindow {
    refusals: AtomicU32,
}

#[async_trait]
impl WindowFocus for FlakyWindow {
    async fn switch_to(&self, _name: &str) -> bool {
        self.refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}

#[derive(Default)]
struct FakeScene {
    scenes: Mutex<Vec<String>>,
}

#[async_trait]
impl StreamScene for FakeScene {
    async fn switch(&self, scene_id: &str) -> bool {
        if let Ok(mut scenes) = self.scenes.lock() {
            scenes.push(scene_id.to_string());
        }
        true
    }
}

#[derive(Default)]
struct FakeLifecycle {
    restarts: AtomicU32,
}

#[async_trait]
impl ProcessLifecycle for FakeLifecycle {
    async fn restart(&self) -> bool {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Restart that never returns.
#[derive(Default)]
struct HungLifecycle {
    restarts: AtomicU32,
}

#[async_trait]
impl ProcessLifecycle for HungLifecycle {
    async fn restart(&self) -> bool {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<bool>().await
    }
}

/// Records the `session_id` of every `session` span opened.
#[derive(Clone, Default)]
struct SessionSpans(Arc<Mutex<Vec<String>>>);

struct SessionIdField(Option<String>);

impl Visit for SessionIdField {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "session_id" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for SessionSpans {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        if attrs.metadata().name() != "session" {
            return;
        }
        let mut field = SessionIdField(None);
        attrs.record(&mut field);
        if let Some(id) = field.0 {
            self.0.lock().unwrap().push(id);
        }
    }
}

/// Offers one match; reports game over after `game_over_after` checks.
struct FakeProbe {
    has_match: bool,
    announced: AtomicBool,
    checks: AtomicU32,
    game_over_after: Option<u32>,
}

impl FakeProbe {
    fn new(has_match: bool, game_over_after: Option<u32>) -> Self {
        Self {
            has_match,
            announced: AtomicBool::new(false),
            checks: AtomicU32::new(0),
            game_over_after,
        }
    }
}

#[async_trait]
impl MatchProbe for FakeProbe {
    async fn find_match(&self) -> Option<MatchInfo> {
        if !self.has_match || self.announced.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(MatchInfo::new("match-1", "Game"))
    }

    async fn load_complete(&self) -> bool {
        true
    }

    async fn view_ready(&self) -> bool {
        true
    }

    async fn game_over(&self, _frame: &Frame) -> bool {
        let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        self.game_over_after.is_some_and(|limit| n >= limit)
    }
}

struct Harness {
    camera: Arc<FakeCamera>,
    scene: Arc<FakeScene>,
    lifecycle: Arc<FakeLifecycle>,
    ports: Collaborators,
}

fn harness(frames: ScriptedFrames, camera: FakeCamera, probe: FakeProbe) -> Harness {
    let camera = Arc::new(camera);
    let scene = Arc::new(FakeScene::default());
    let lifecycle = Arc::new(FakeLifecycle::default());
    let ports = Collaborators {
        frames: Arc::new(frames),
        camera: camera.clone(),
        window: Arc::new(FakeWindow),
        scene: scene.clone(),
        lifecycle: lifecycle.clone(),
        probe: Arc::new(probe),
    };
    Harness {
        camera,
        scene,
        lifecycle,
        ports,
    }
}

fn frames(failures: u32) -> ScriptedFrames {
    ScriptedFrames {
        calls: AtomicU32::new(0),
        failures,
    }
}

fn config() -> DirectorConfig {
    let mut config = DirectorConfig::default();
    config.capture.region = Rect::new(0.0, 0.0, 100.0, 100.0);
    config.capture.interval_ms = 50;
    config.tick.period_ms = 100;
    config.tick.frame_wait_ms = 200;
    config.observers.position_log_interval_ms = 0;
    config
}

fn stop_after(tx: watch::Sender<bool>, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        tx.send(true).ok();
    });
}

fn visited(director: &Director) -> Vec<SessionState> {
    director.controller().history().map(|t| t.to).collect()
}

/// Capture failures and a broken camera never take the loop down.
#[tokio::test(start_paused = true)]
async fn test_director_survives_capture_and_camera_failures() {
    let h = harness(
        frames(12),
        FakeCamera {
            broken: true,
            ..Default::default()
        },
        FakeProbe::new(true, None),
    );
    let (tx, rx) = watch::channel(false);
    let mut director = Director::new(config(), h.ports.clone(), rx)
        .unwrap()
        .with_scheduler_rng(StdRng::seed_from_u64(1));

    stop_after(tx, Duration::from_secs(20));
    director.run().await.unwrap();

    assert_eq!(director.state(), SessionState::Spectating);
    assert_eq!(
        visited(&director),
        vec![
            SessionState::FindingTarget,
            SessionState::TargetFound,
            SessionState::Loading,
            SessionState::SettingUpView,
            SessionState::Spectating,
        ]
    );
    assert!(h.camera.focus.load(Ordering::SeqCst) >= 2);
    assert!(director.current_view().is_some());
    assert!(director.subscribe_snapshots().borrow().seq > 0);

    let scenes = h.scene.scenes.lock().unwrap().clone();
    assert_eq!(scenes, vec!["starting", "intermission", "live"]);
}

/// Exhausted retries end in a hard recovery and a fresh search.
#[tokio::test(start_paused = true)]
async fn test_exhausted_search_triggers_hard_recovery() {
    let h = harness(frames(0), FakeCamera::default(), FakeProbe::new(false, None));
    let mut config = config();
    config.session = config
        .session
        .with_policy(SessionState::FindingTarget, StatePolicy::new(0.5, 2));

    let (tx, rx) = watch::channel(false);
    let mut director = Director::new(config, h.ports.clone(), rx).unwrap();
    stop_after(tx, Duration::from_secs(5));
    director.run().await.unwrap();

    assert!(h.lifecycle.restarts.load(Ordering::SeqCst) >= 1);
    let kinds: Vec<TransitionKind> = director.controller().history().map(|t| t.kind).collect();
    assert!(kinds.contains(&TransitionKind::Rearm));
    assert!(kinds.contains(&TransitionKind::Escalation));
    let recovered = director
        .controller()
        .history()
        .find(|t| t.kind == TransitionKind::HardRecovery)
        .unwrap();
    assert_eq!(
        (recovered.from, recovered.to),
        (SessionState::Error, SessionState::FindingTarget)
    );

    let scenes = h.scene.scenes.lock().unwrap().clone();
    assert!(scenes.contains(&"technical_difficulties".to_string()));
}

/// A detected game over ends the session and starts looking again.
#[tokio::test(start_paused = true)]
async fn test_game_over_returns_to_search() {
    let h = harness(frames(0), FakeCamera::default(), FakeProbe::new(true, Some(5)));
    let (tx, rx) = watch::channel(false);
    let mut director = Director::new(config(), h.ports.clone(), rx).unwrap();

    stop_after(tx, Duration::from_secs(5));
    director.run().await.unwrap();

    let path = visited(&director);
    assert!(path.ends_with(&[
        SessionState::Spectating,
        SessionState::Ended,
        SessionState::FindingTarget
    ]));
    assert_eq!(director.state(), SessionState::FindingTarget);
    assert!(director.context().match_info.is_none());
    assert!(director.current_view().is_none());
}

/// Shutdown interrupts the failure backoff instead of waiting it out.
#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_backoff() {
    let h = harness(frames(u32::MAX), FakeCamera::default(), FakeProbe::new(true, None));
    let mut config = config();
    config.tick.backoff_base_ms = 5000;
    config.tick.backoff_max_ms = 60_000;

    let (tx, rx) = watch::channel(false);
    let mut director = Director::new(config, h.ports.clone(), rx).unwrap();

    let started = tokio::time::Instant::now();
    stop_after(tx, Duration::from_secs(3));
    director.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(director.state(), SessionState::Spectating);
    assert_eq!(h.camera.focus.load(Ordering::SeqCst), 0);
}

/// A signal sent before the loop starts stops it immediately.
#[tokio::test(start_paused = true)]
async fn test_shutdown_before_start() {
    let h = harness(frames(0), FakeCamera::default(), FakeProbe::new(true, None));
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let mut director = Director::new(config(), h.ports.clone(), rx).unwrap();
    director.run().await.unwrap();
    assert_eq!(director.state(), SessionState::Initializing);
    assert!(director.controller().history().next().is_none());
}

/// Inconsistent configuration is rejected up front.
#[test]
fn test_invalid_config_is_rejected() {
    let h = harness(frames(0), FakeCamera::default(), FakeProbe::new(true, None));
    let mut config = config();
    config.scheduler.min_dwell = 9.0;
    config.scheduler.max_dwell = 3.0;

    let (_tx, rx) = watch::channel(false);
    assert!(matches!(
        Director::new(config, h.ports, rx),
        Err(DirectorError::Config(_))
    ));
}

/// A restart that never finishes keeps the loop ticking and lets shutdown through.
#[tokio::test(start_paused = true)]
async fn test_hung_restart_does_not_block_shutdown() {
    let mut h = harness(frames(0), FakeCamera::default(), FakeProbe::new(false, None));
    let lifecycle = Arc::new(HungLifecycle::default());
    h.ports.lifecycle = lifecycle.clone();
    let mut config = config();
    config.session = config
        .session
        .with_policy(SessionState::FindingTarget, StatePolicy::new(0.2, 1));

    let (tx, rx) = watch::channel(false);
    let mut director = Director::new(config, h.ports.clone(), rx).unwrap();

    let started = tokio::time::Instant::now();
    stop_after(tx, Duration::from_secs(1));
    director.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(lifecycle.restarts.load(Ordering::SeqCst), 1);
    assert_eq!(director.state(), SessionState::Error);
    assert!(director
        .controller()
        .history()
        .all(|t| t.kind != TransitionKind::HardRecovery));
}

/// A refused window focus is retried on the next tick without backoff.
#[tokio::test(start_paused = true)]
async fn test_focus_failures_do_not_back_off() {
    let mut h = harness(frames(0), FakeCamera::default(), FakeProbe::new(true, None));
    h.ports.window = Arc::new(FlakyWindow {
        refusals: AtomicU32::new(3),
    });
    let mut config = config();
    config.tick.backoff_base_ms = 5000;
    config.tick.backoff_max_ms = 60_000;

    let (tx, rx) = watch::channel(false);
    let mut director = Director::new(config, h.ports.clone(), rx).unwrap();
    stop_after(tx, Duration::from_secs(2));
    director.run().await.unwrap();

    assert_eq!(director.state(), SessionState::Spectating);
}

/// Events of each tick are scoped to the session that was current.
#[tokio::test(start_paused = true)]
async fn test_ticks_run_inside_session_span() {
    let spans = SessionSpans::default();
    let subscriber = tracing_subscriber::registry().with(spans.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = harness(frames(0), FakeCamera::default(), FakeProbe::new(true, None));
    let (tx, rx) = watch::channel(false);
    let mut director = Director::new(config(), h.ports.clone(), rx).unwrap();
    stop_after(tx, Duration::from_secs(2));
    director.run().await.unwrap();

    let ids = spans.0.lock().unwrap().clone();
    let session = director.context().session_id.to_string();
    assert!(ids.len() > 5);
    assert_eq!(ids.last(), Some(&session));
    // Ticks before the match belong to the idle session.
    assert!(ids.iter().any(|id| *id != session));
}

/// Every snapshot a reader sees comes from one complete recompute.
#[tokio::test(start_paused = true)]
async fn test_snapshot_readers_see_whole_recomputes() {
    let mut h = harness(frames(0), FakeCamera::default(), FakeProbe::new(true, None));
    h.ports.frames = Arc::new(TerritoryFrames);
    let (tx, rx) = watch::channel(false);
    let mut director = Director::new(config(), h.ports.clone(), rx).unwrap();

    let mut snapshots = director.subscribe_snapshots();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let reader = {
        let seen = seen.clone();
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                seen.lock().unwrap().push(snapshot);
            }
        })
    };

    stop_after(tx, Duration::from_secs(8));
    director.run().await.unwrap();
    reader.abort();

    let seen = seen.lock().unwrap().clone();
    let recomputes: Vec<_> = seen.iter().filter(|s| s.seq > 0).collect();
    assert!(recomputes.len() >= 3, "only {} recomputes seen", recomputes.len());
    assert!(recomputes
        .iter()
        .any(|s| s.factions.values().any(|t| t.registered)));

    for pair in recomputes.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
        assert!(pair[0].session_time <= pair[1].session_time);
    }
    for snapshot in &recomputes {
        assert!(snapshot
            .conflicts
            .windows(2)
            .all(|w| w[0].importance >= w[1].importance));
        for conflict in &snapshot.conflicts {
            assert!(
                snapshot
                    .factions
                    .get(&conflict.defender)
                    .is_some_and(|t| t.registered),
                "seq {}: raid on unregistered {}",
                snapshot.seq,
                conflict.defender
            );
            assert!(snapshot.factions.contains_key(&conflict.attacker));
        }
        for zone in &snapshot.expansions {
            if let Some(faction) = zone.faction {
                assert!(snapshot.factions.contains_key(&faction));
            }
        }
    }
}

//! Director configuration.
//!
//! Defaults are usable out of the box. `from_env()` layers an optional JSON
//! file, an optional faction-rule file and scalar environment overrides on
//! top of them.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use caster_models::{PlayableRegion, Rect};
use caster_vision::{ActivityConfig, ClassificationTable, TerritoryConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DirectorError, DirectorResult};
use crate::scheduler::SchedulerConfig;
use crate::session::SessionConfig;

/// Tick loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Minimum tick period (default: 500)
    pub period_ms: u64,
    /// How long a tick waits for a fresh frame (default: 400)
    pub frame_wait_ms: u64,
    /// Bound on probe and window calls (default: 2000)
    pub action_timeout_ms: u64,
    /// First backoff after a failed tick (default: 200)
    pub backoff_base_ms: u64,
    /// Backoff ceiling (default: 5000)
    pub backoff_max_ms: u64,
    /// Consecutive failures logged before suppression (default: 5)
    pub max_logged_failures: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period_ms: 500,
            frame_wait_ms: 400,
            action_timeout_ms: 2000,
            backoff_base_ms: 200,
            backoff_max_ms: 5000,
            max_logged_failures: 5,
        }
    }
}

impl TickConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

/// Capture region and worker timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Screen rectangle holding the overhead map
    pub region: Rect,
    /// Map-space rectangles the camera must never target (HUD overlays)
    pub exclusions: Vec<Rect>,
    /// Bound on a single capture (default: 1000)
    pub timeout_ms: u64,
    /// Capture cadence (default: 250)
    pub interval_ms: u64,
    /// Replay directory used by the bundled binary
    pub frame_dir: Option<PathBuf>,
    /// Restart the replay when it runs out of frames
    pub replay_loop: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            region: Rect::new(0.0, 0.0, 256.0, 256.0),
            exclusions: Vec::new(),
            timeout_ms: 1000,
            interval_ms: 250,
            frame_dir: None,
            replay_loop: false,
        }
    }
}

impl CaptureConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Playable region in map coordinates, for frames of the configured size.
    pub fn playable_region(&self) -> PlayableRegion {
        self.playable_region_for(self.region.width as u32, self.region.height as u32)
    }

    /// Playable region for frames of `width` x `height`.
    pub fn playable_region_for(&self, width: u32, height: u32) -> PlayableRegion {
        self.exclusions
            .iter()
            .fold(PlayableRegion::full(width, height), |region, rect| {
                region.with_exclusion(*rect)
            })
    }
}

/// Camera follow geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Follow box around a conflict, in map pixels (default: 64 x 48)
    pub follow_width: f64,
    pub follow_height: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            follow_width: 64.0,
            follow_height: 48.0,
        }
    }
}

/// Background observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Heatmap PNG output; disabled when unset
    pub heatmap_path: Option<PathBuf>,
    /// Heatmap write cadence (default: 5000)
    pub heatmap_interval_ms: u64,
    /// Position log cadence; 0 disables (default: 30000)
    pub position_log_interval_ms: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            heatmap_path: None,
            heatmap_interval_ms: 5000,
            position_log_interval_ms: 30_000,
        }
    }
}

/// Complete director configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    pub tick: TickConfig,
    pub capture: CaptureConfig,
    pub camera: CameraConfig,
    pub territory: TerritoryConfig,
    pub activity: ActivityConfig,
    pub scheduler: SchedulerConfig,
    pub session: SessionConfig,
    pub observers: ObserverConfig,
    /// Per-faction marker color rules
    pub factions: ClassificationTable,
    /// Prometheus scrape address; metrics are off when unset
    pub metrics_addr: Option<String>,
}

impl DirectorConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> DirectorResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var("CASTER_CONFIG") {
            Ok(path) => Self::load(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(path) = std::env::var("CASTER_FACTION_RULES") {
            config.factions = ClassificationTable::load(&path)?;
            info!("Loaded {} faction rules from {}", config.factions.len(), path);
        }

        if let Some(preset) = std::env::var("CASTER_SCHEDULER_PRESET").ok() {
            config.scheduler = match preset.as_str() {
                "calm" => SchedulerConfig::calm(),
                "action" => SchedulerConfig::action(),
                "default" => SchedulerConfig::default(),
                other => {
                    return Err(DirectorError::config_error(format!(
                        "unknown scheduler preset '{other}'"
                    )))
                }
            };
        }

        if let Some(ms) = env_parse("CASTER_TICK_MS") {
            config.tick.period_ms = ms;
        }
        if let Some(ms) = env_parse("CASTER_CAPTURE_TIMEOUT_MS") {
            config.capture.timeout_ms = ms;
        }
        if let Some(ms) = env_parse("CASTER_CAPTURE_INTERVAL_MS") {
            config.capture.interval_ms = ms;
        }
        if let Some(ms) = env_parse("CASTER_ACTION_TIMEOUT_MS") {
            config.tick.action_timeout_ms = ms;
        }
        if let Some(dir) = std::env::var("CASTER_FRAME_DIR").ok() {
            config.capture.frame_dir = Some(PathBuf::from(dir));
        }
        if let Some(looping) = env_parse("CASTER_REPLAY_LOOP") {
            config.capture.replay_loop = looping;
        }
        if let Some(path) = std::env::var("CASTER_HEATMAP_PATH").ok() {
            config.observers.heatmap_path = Some(PathBuf::from(path));
        }
        if let Some(addr) = std::env::var("CASTER_METRICS_ADDR").ok() {
            config.metrics_addr = Some(addr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file; missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> DirectorResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| {
            DirectorError::config_error(format!("{}: {}", path.display(), e))
        })
    }

    /// Reject inconsistent values.
    pub fn validate(&self) -> DirectorResult<()> {
        let mut problems = Vec::new();

        if self.tick.period_ms == 0 {
            problems.push("tick.period_ms must be positive".to_string());
        }
        if self.tick.backoff_base_ms > self.tick.backoff_max_ms {
            problems.push("tick.backoff_base_ms exceeds tick.backoff_max_ms".to_string());
        }
        if self.capture.timeout_ms == 0 || self.capture.interval_ms == 0 {
            problems.push("capture timeout and interval must be positive".to_string());
        }
        if self.capture.region.width < 1.0 || self.capture.region.height < 1.0 {
            problems.push("capture.region must be at least 1x1".to_string());
        }
        if !self.capture.playable_region().is_valid() {
            problems.push("capture.exclusions leave no playable region".to_string());
        }
        if self.camera.follow_width <= 0.0 || self.camera.follow_height <= 0.0 {
            problems.push("camera follow box must be positive".to_string());
        }
        if self.activity.reference_area <= 0.0 {
            problems.push("activity.reference_area must be positive".to_string());
        }
        if let Err(e) = self.factions.validate() {
            problems.push(e.to_string());
        }

        problems.extend(self.territory.problems());
        problems.extend(self.scheduler.problems());
        problems.extend(self.session.problems());

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DirectorError::config_error(problems.join("; ")))
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

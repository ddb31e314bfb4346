//! Collaborator interfaces.
//!
//! Everything outside the decision engine (capture, input injection, window
//! management, streaming software, process supervision, match discovery)
//! sits behind these traits.

use std::sync::Arc;

use async_trait::async_trait;
use caster_models::{MatchInfo, Point, Rect};
use caster_vision::Frame;

use crate::error::DirectorResult;

/// Source of overhead-map frames.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Capture `region` of the screen. `Ok(None)` is a transient miss.
    async fn capture(&self, region: Rect) -> DirectorResult<Option<Frame>>;
}

/// Moves the in-game camera. Best effort.
#[async_trait]
pub trait CameraActuator: Send + Sync {
    /// Center the view on a map position.
    async fn focus(&self, position: Point) -> DirectorResult<()>;

    /// Follow the action inside a map rectangle.
    async fn drag_follow(&self, rect: Rect) -> DirectorResult<()>;
}

#[async_trait]
pub trait WindowFocus: Send + Sync {
    /// Bring the named window to the front.
    async fn switch_to(&self, name: &str) -> bool;
}

#[async_trait]
pub trait StreamScene: Send + Sync {
    /// Switch the stream to `scene_id`.
    async fn switch(&self, scene_id: &str) -> bool;
}

#[async_trait]
pub trait ProcessLifecycle: Send + Sync {
    /// Restart the game client. Only called from `Error` recovery.
    async fn restart(&self) -> bool;
}

/// Discovery, loading and end-of-game signals.
#[async_trait]
pub trait MatchProbe: Send + Sync {
    async fn find_match(&self) -> Option<MatchInfo>;

    async fn load_complete(&self) -> bool;

    async fn view_ready(&self) -> bool;

    async fn game_over(&self, frame: &Frame) -> bool;
}

/// The full set of collaborators a `Director` drives.
#[derive(Clone)]
pub struct Collaborators {
    pub frames: Arc<dyn FrameSource>,
    pub camera: Arc<dyn CameraActuator>,
    pub window: Arc<dyn WindowFocus>,
    pub scene: Arc<dyn StreamScene>,
    pub lifecycle: Arc<dyn ProcessLifecycle>,
    pub probe: Arc<dyn MatchProbe>,
}

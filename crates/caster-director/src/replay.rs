//! Thin adapters for offline runs of the binary.
//!
//! Frames are replayed from a directory of PNG files; the camera, window,
//! scene and lifecycle ports only log what they were asked to do.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use caster_models::{MatchInfo, Point, Rect};
use caster_vision::Frame;
use image::imageops;
use tracing::{debug, info, warn};

use crate::error::{DirectorError, DirectorResult};
use crate::ports::{
    CameraActuator, FrameSource, MatchProbe, ProcessLifecycle, StreamScene, WindowFocus,
};

/// Replays PNG frames from a directory in file-name order.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    cursor: AtomicUsize,
    looping: bool,
}

impl DirectoryFrameSource {
    /// Index the PNG files in `dir`.
    pub fn open(dir: impl AsRef<Path>, looping: bool) -> DirectorResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut frames: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
            })
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(DirectorError::config_error(format!(
                "no PNG frames in {}",
                dir.display()
            )));
        }
        info!("Replaying {} frames from {}", frames.len(), dir.display());

        Ok(Self {
            dir,
            frames,
            cursor: AtomicUsize::new(0),
            looping,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// True once a non-looping replay has served every frame.
    pub fn is_exhausted(&self) -> bool {
        !self.looping && self.cursor.load(Ordering::SeqCst) >= self.frames.len()
    }

    fn next_path(&self) -> Option<PathBuf> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        if index < self.frames.len() {
            self.frames.get(index).cloned()
        } else if self.looping {
            self.frames.get(index % self.frames.len()).cloned()
        } else {
            self.cursor.store(self.frames.len(), Ordering::SeqCst);
            None
        }
    }
}

#[async_trait]
impl FrameSource for DirectoryFrameSource {
    async fn capture(&self, region: Rect) -> DirectorResult<Option<Frame>> {
        let Some(path) = self.next_path() else {
            return Ok(None);
        };

        let frame = tokio::task::spawn_blocking(move || Frame::open(&path))
            .await
            .map_err(|e| DirectorError::capture_failure(format!("decode task: {e}")))??;

        Ok(Some(crop_to(frame, region)))
    }
}

/// Crop a full-screen frame to `region`; frames already at map size pass through.
fn crop_to(frame: Frame, region: Rect) -> Frame {
    let fits = region.x >= 0.0
        && region.y >= 0.0
        && region.x2() <= frame.width() as f64
        && region.y2() <= frame.height() as f64;
    let same = region.width as u32 == frame.width() && region.height as u32 == frame.height();
    if !fits || same || region.width < 1.0 || region.height < 1.0 {
        return frame;
    }
    let view = imageops::crop_imm(
        frame.image(),
        region.x as u32,
        region.y as u32,
        region.width as u32,
        region.height as u32,
    );
    Frame::new(view.to_image())
}

/// Reports one match for the replay and ends it when the frames run out.
#[derive(Debug)]
pub struct ReplayProbe {
    source: Arc<DirectoryFrameSource>,
    announced: AtomicBool,
}

impl ReplayProbe {
    pub fn new(source: Arc<DirectoryFrameSource>) -> Self {
        Self {
            source,
            announced: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MatchProbe for ReplayProbe {
    async fn find_match(&self) -> Option<MatchInfo> {
        if self.announced.swap(true, Ordering::SeqCst) {
            return None;
        }
        let name = self
            .source
            .dir()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("frames");
        Some(MatchInfo::new(format!("replay-{name}"), "replay"))
    }

    async fn load_complete(&self) -> bool {
        true
    }

    async fn view_ready(&self) -> bool {
        true
    }

    async fn game_over(&self, _frame: &Frame) -> bool {
        self.source.is_exhausted()
    }
}

/// Camera that logs commands instead of moving anything.
#[derive(Debug, Default)]
pub struct LoggingCamera;

#[async_trait]
impl CameraActuator for LoggingCamera {
    async fn focus(&self, position: Point) -> DirectorResult<()> {
        info!("Camera focus ({:.0}, {:.0})", position.x, position.y);
        Ok(())
    }

    async fn drag_follow(&self, rect: Rect) -> DirectorResult<()> {
        info!(
            "Camera follow ({:.0}, {:.0}) {:.0}x{:.0}",
            rect.x, rect.y, rect.width, rect.height
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopWindow;

#[async_trait]
impl WindowFocus for NoopWindow {
    async fn switch_to(&self, name: &str) -> bool {
        debug!("Window focus '{}'", name);
        true
    }
}

#[derive(Debug, Default)]
pub struct NoopScene;

#[async_trait]
impl StreamScene for NoopScene {
    async fn switch(&self, scene_id: &str) -> bool {
        info!("Stream scene -> {}", scene_id);
        true
    }
}

#[derive(Debug, Default)]
pub struct NoopLifecycle;

#[async_trait]
impl ProcessLifecycle for NoopLifecycle {
    async fn restart(&self) -> bool {
        warn!("Game restart requested; nothing to restart in replay mode");
        true
    }
}

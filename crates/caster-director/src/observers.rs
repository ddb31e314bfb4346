//! Background observers of the territory snapshot.
//!
//! Each observer runs as its own periodic task and only ever reads the
//! latest published `Arc<TerritorySnapshot>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use caster_models::TerritorySnapshot;
use caster_vision::VisionError;
use image::{imageops, ImageFormat, Rgb, RgbImage};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ObserverConfig;
use crate::error::{DirectorError, DirectorResult};
use crate::retry::FailureTracker;

/// Receiver side of the snapshot channel.
pub type SnapshotReceiver = watch::Receiver<Arc<TerritorySnapshot>>;

/// Start every observer enabled in `config`.
pub fn spawn_observers(
    config: &ObserverConfig,
    snapshots: &SnapshotReceiver,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(path) = &config.heatmap_path {
        let writer = HeatmapWriter::new(path.clone());
        handles.push(tokio::spawn(writer.run(
            Duration::from_millis(config.heatmap_interval_ms.max(1)),
            snapshots.clone(),
            shutdown.clone(),
        )));
    }

    if config.position_log_interval_ms > 0 {
        handles.push(tokio::spawn(log_positions(
            Duration::from_millis(config.position_log_interval_ms),
            snapshots.clone(),
            shutdown.clone(),
        )));
    }

    handles
}

/// Writes the combined density heatmap as a PNG whenever the snapshot advances.
pub struct HeatmapWriter {
    path: PathBuf,
    last_seq: u64,
    failures: FailureTracker,
}

impl HeatmapWriter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_seq: 0,
            failures: FailureTracker::new(3),
        }
    }

    /// Write `snapshot` if it is newer than the last one written.
    ///
    /// Encoding and the file swap run on the blocking pool. Returns whether a
    /// file was written.
    pub async fn observe(&mut self, snapshot: Arc<TerritorySnapshot>) -> bool {
        if snapshot.seq <= self.last_seq {
            return false;
        }
        let seq = snapshot.seq;
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || write_heatmap(&snapshot, &path))
            .await
            .map_err(|e| DirectorError::Io(std::io::Error::other(format!("heatmap task: {e}"))))
            .and_then(|r| r);
        match result {
            Ok(written) => {
                self.failures.record_success();
                self.last_seq = seq;
                if written {
                    debug!("Heatmap #{} written to {}", seq, self.path.display());
                }
                written
            }
            Err(e) => {
                if self.failures.record_failure() {
                    warn!("Heatmap write failed: {}", e);
                }
                false
            }
        }
    }

    async fn run(
        mut self,
        period: Duration,
        snapshots: SnapshotReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let snapshot = snapshots.borrow().clone();
                    self.observe(snapshot).await;
                }
            }
        }
    }
}

/// Render the snapshot's heatmap at map resolution and write it to `path`.
///
/// Each cell takes its dominant faction's display color scaled by density.
/// The file is replaced atomically. Returns `false` when the snapshot has no
/// heatmap yet.
pub fn write_heatmap(snapshot: &TerritorySnapshot, path: &Path) -> DirectorResult<bool> {
    let Some(heatmap) = &snapshot.heatmap else {
        return Ok(false);
    };
    if heatmap.width == 0 || heatmap.height == 0 {
        return Ok(false);
    }

    let cells = RgbImage::from_fn(heatmap.width, heatmap.height, |x, y| {
        match heatmap.get(x, y) {
            Some((faction, density)) => {
                let scale = density.clamp(0.0, 1.0);
                let [r, g, b] = faction.display_rgb();
                Rgb([
                    (r as f32 * scale).round() as u8,
                    (g as f32 * scale).round() as u8,
                    (b as f32 * scale).round() as u8,
                ])
            }
            None => Rgb([0, 0, 0]),
        }
    });
    let cell = heatmap.cell.max(1);
    let image = imageops::resize(
        &cells,
        heatmap.width * cell,
        heatmap.height * cell,
        imageops::FilterType::Nearest,
    );

    let tmp = path.with_extension("png.tmp");
    image
        .save_with_format(&tmp, ImageFormat::Png)
        .map_err(VisionError::from)?;
    std::fs::rename(&tmp, path)?;
    Ok(true)
}

/// One log line per registered faction plus one per conflict.
pub fn describe(snapshot: &TerritorySnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    for (faction, territory) in snapshot.factions.iter().filter(|(_, t)| t.registered) {
        let base = match &territory.base {
            Some(base) => format!(
                "base ({:.0}, {:.0}) conf {:.2}",
                base.position.x, base.position.y, base.confidence
            ),
            None => "no base".to_string(),
        };
        let forward: Vec<String> = territory
            .forward
            .iter()
            .map(|f| format!("({:.0}, {:.0})", f.position.x, f.position.y))
            .collect();
        lines.push(format!(
            "{}: {}, {} forward [{}]",
            faction,
            base,
            forward.len(),
            forward.join(", ")
        ));
    }
    for conflict in &snapshot.conflicts {
        lines.push(format!(
            "raid: {} -> {} at ({:.0}, {:.0}) importance {:.2}",
            conflict.attacker,
            conflict.defender,
            conflict.position.x,
            conflict.position.y,
            conflict.importance
        ));
    }
    lines
}

async fn log_positions(
    period: Duration,
    snapshots: SnapshotReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_seq = 0;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let snapshot = snapshots.borrow().clone();
                if snapshot.seq != last_seq {
                    last_seq = snapshot.seq;
                    for line in describe(&snapshot) {
                        info!(seq = snapshot.seq, "Positions: {}", line);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caster_models::{
        Conflict, Faction, FactionTerritory, ForwardPosition, Heatmap, MainBase, Point,
    };

    fn snapshot(seq: u64) -> TerritorySnapshot {
        let mut snapshot = TerritorySnapshot::empty();
        snapshot.seq = seq;
        snapshot.heatmap = Some(Heatmap {
            width: 2,
            height: 1,
            cell: 4,
            cells: vec![Some((Faction::Red, 1.0)), None],
        });
        snapshot
    }

    #[test]
    fn test_heatmap_png_matches_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heatmap.png");

        assert!(write_heatmap(&snapshot(1), &path).unwrap());
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(img.get_pixel(1, 1).0, Faction::Red.display_rgb());
        assert_eq!(img.get_pixel(6, 2).0, [0, 0, 0]);
        assert!(!dir.path().join("heatmap.png.tmp").exists());
    }

    #[tokio::test]
    async fn test_writer_skips_stale_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = HeatmapWriter::new(dir.path().join("heatmap.png"));

        assert!(!writer.observe(Arc::new(TerritorySnapshot::empty())).await);
        assert!(writer.observe(Arc::new(snapshot(3))).await);
        assert!(!writer.observe(Arc::new(snapshot(3))).await);
        assert!(!writer.observe(Arc::new(snapshot(2))).await);
        assert!(writer.observe(Arc::new(snapshot(4))).await);
    }

    #[tokio::test]
    async fn test_writer_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = HeatmapWriter::new(dir.path().join("missing").join("heatmap.png"));

        assert!(!writer.observe(Arc::new(snapshot(1))).await);
        // A failed write is retried on the next snapshot, not skipped.
        std::fs::create_dir(dir.path().join("missing")).unwrap();
        assert!(writer.observe(Arc::new(snapshot(1))).await);
    }

    #[test]
    fn test_describe_lists_factions_and_raids() {
        let mut snapshot = TerritorySnapshot::empty();
        snapshot.factions.insert(
            Faction::Red,
            FactionTerritory {
                registered: true,
                base: Some(MainBase {
                    position: Point::new(20.0, 20.0),
                    confidence: 0.8,
                }),
                forward: vec![ForwardPosition {
                    position: Point::new(60.0, 20.0),
                    area: 10.0,
                    distance_from_base: 40.0,
                    strategic_value: 2.0,
                }],
                peak_density: 0.9,
            },
        );
        snapshot.conflicts.push(Conflict {
            position: Point::new(22.0, 24.0),
            attacker: Faction::Blue,
            defender: Faction::Red,
            importance: 0.75,
        });

        let lines = describe(&snapshot);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "red: base (20, 20) conf 0.80, 1 forward [(60, 20)]");
        assert_eq!(lines[1], "raid: blue -> red at (22, 24) importance 0.75");
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers_stop_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = ObserverConfig {
            heatmap_path: Some(dir.path().join("heatmap.png")),
            heatmap_interval_ms: 100,
            position_log_interval_ms: 100,
        };
        let (snap_tx, snap_rx) = watch::channel(Arc::new(TerritorySnapshot::empty()));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handles = spawn_observers(&config, &snap_rx, &stop_rx);
        assert_eq!(handles.len(), 2);

        snap_tx.send_replace(Arc::new(snapshot(1)));
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(dir.path().join("heatmap.png").exists());

        stop_tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}

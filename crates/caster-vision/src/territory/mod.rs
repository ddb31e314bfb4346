//! Territory model.
//!
//! Turns per-frame presence into stable territorial facts:
//! 1. Spatially smoothed, temporally blended density field per faction
//! 2. Registration of factions after sustained detection
//! 3. Sticky main-base inference with a hysteresis band
//! 4. Forward positions, recomputed wholesale and sorted by strategic value
//! 5. Raids between every ordered faction pair
//! 6. Expansion zones from the density increase since the last recompute
//!
//! The costly work only runs once per `recompute_interval`; between
//! recomputes every query answers from the cached results.

mod base;
pub mod config;
mod expansion;
mod raid;


pub use config::TerritoryConfig;

use std::collections::BTreeMap;

use caster_models::{
    ActivityZone, Conflict, Faction, FactionTerritory, ForwardPosition, Heatmap, MainBase,
    TerritorySnapshot,
};
use chrono::Utc;
use ndarray::{s, Array2};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::density::{blend, box_blur};
use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;
use crate::presence::{PresenceExtractor, PresenceMask};

/// Minimum heatmap cell density worth drawing.
const HEATMAP_FLOOR: f32 = 0.05;

/// Outcome of a call to [`TerritoryModel::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerritoryUpdate {
    /// Density work ran and every cached result was replaced
    Recomputed,
    /// Too soon since the last recompute; cached results kept
    Cached,
}

/// Per-faction territory state.
#[derive(Debug, Clone)]
pub(crate) struct FactionTrack {
    /// Smoothed density field
    pub(crate) density: Array2<f32>,
    /// Field before the latest blend, for expansion differencing
    previous: Option<Array2<f32>>,
    /// Field was seeded this cycle and must not be blended again
    fresh: bool,
    /// Consecutive recomputes with enough presence
    streak: u32,
    pub(crate) registered: bool,
    pub(crate) base: Option<MainBase>,
    pub(crate) forward: Vec<ForwardPosition>,
    expansions: Vec<ActivityZone>,
    peak: f32,
}

impl FactionTrack {
    fn seeded(density: Array2<f32>) -> Self {
        Self {
            density,
            previous: None,
            fresh: true,
            streak: 0,
            registered: false,
            base: None,
            forward: Vec::new(),
            expansions: Vec::new(),
            peak: 0.0,
        }
    }

    /// Advance one recompute cycle.
    fn advance(
        &mut self,
        faction: Faction,
        mask: Option<&PresenceMask>,
        config: &TerritoryConfig,
        map_diagonal: f64,
        now: f64,
    ) {
        if self.fresh {
            self.fresh = false;
            self.previous = None;
        } else {
            let next = match mask {
                Some(mask) => box_blur(&mask.to_density(), config.smoothing_radius),
                None => Array2::zeros(self.density.dim()),
            };
            self.previous = Some(self.density.clone());
            blend(&mut self.density, &next, config.temporal_alpha);
        }

        let pixels = mask.map_or(0, PresenceMask::count);
        if pixels >= config.registration_min_pixels {
            self.streak += 1;
        } else {
            self.streak = 0;
        }
        if !self.registered && self.streak >= config.registration_updates {
            self.registered = true;
            info!("Registered faction {} after {} sustained updates", faction, self.streak);
        }

        if self.registered {
            self.base = base::infer_base(&self.density, self.base, config);
            self.forward = match &self.base {
                Some(b) => base::forward_positions(&self.density, b, config, map_diagonal),
                None => Vec::new(),
            };
        }

        self.expansions =
            expansion::detect(faction, &self.density, self.previous.as_ref(), config, now);
        self.peak = self.density.iter().copied().fold(0.0, f32::max);
    }
}

/// Maintains per-faction territory inferred from successive frames.
pub struct TerritoryModel {
    config: TerritoryConfig,
    extractor: PresenceExtractor,
    tracks: BTreeMap<Faction, FactionTrack>,
    /// Frame dimensions fixed by the first accepted frame
    dims: Option<(u32, u32)>,
    started_at: Option<f64>,
    last_recompute: Option<f64>,
    conflicts: Vec<Conflict>,
    seq: u64,
}

impl TerritoryModel {
    /// Create a new territory model.
    pub fn new(config: TerritoryConfig, extractor: PresenceExtractor) -> Self {
        Self {
            config,
            extractor,
            tracks: BTreeMap::new(),
            dims: None,
            started_at: None,
            last_recompute: None,
            conflicts: Vec::new(),
            seq: 0,
        }
    }

    pub fn config(&self) -> &TerritoryConfig {
        &self.config
    }

    /// Recompute sequence number; bumps on every recompute.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Feed a frame captured at session time `now`.
    ///
    /// A malformed frame or a frame whose size differs from the session's
    /// first frame is rejected with a classification error and leaves every
    /// cached result untouched.
    pub fn update(&mut self, frame: &Frame, now: f64) -> VisionResult<TerritoryUpdate> {
        if frame.is_malformed() {
            warn!("Territory update skipped: malformed frame {}", frame.seq());
            return Err(VisionError::malformed(format!(
                "frame {} has no pixels",
                frame.seq()
            )));
        }
        if let Some((w, h)) = self.dims {
            if (w, h) != (frame.width(), frame.height()) {
                warn!(
                    "Territory update skipped: frame is {}x{}, session is {}x{}",
                    frame.width(),
                    frame.height(),
                    w,
                    h
                );
                return Err(VisionError::DimensionMismatch {
                    expected_width: w,
                    expected_height: h,
                    actual_width: frame.width(),
                    actual_height: frame.height(),
                });
            }
        }

        if let Some(last) = self.last_recompute {
            if now - last < self.config.recompute_interval {
                return Ok(TerritoryUpdate::Cached);
            }
        }

        self.recompute(frame, now);
        Ok(TerritoryUpdate::Recomputed)
    }

    fn recompute(&mut self, frame: &Frame, now: f64) {
        let presence = self.extractor.extract(frame);
        self.dims.get_or_insert((frame.width(), frame.height()));
        let started_at = *self.started_at.get_or_insert(now);

        for (faction, mask) in &presence {
            self.tracks.entry(*faction).or_insert_with(|| {
                debug!("Tracking new faction {}", faction);
                FactionTrack::seeded(box_blur(&mask.to_density(), self.config.smoothing_radius))
            });
        }

        let config = &self.config;
        let diagonal = frame.bounds().diagonal();
        self.tracks.par_iter_mut().for_each(|(faction, track)| {
            track.advance(*faction, presence.get(faction), config, diagonal, now);
        });

        let boost = if now - started_at < config.early_game_duration {
            config.early_game_boost
        } else {
            1.0
        };
        self.conflicts = raid::detect(&self.tracks, config, boost);
        self.last_recompute = Some(now);
        self.seq += 1;

        debug!(
            "Territory recompute #{} at {:.1}s: {} factions, {} conflicts",
            self.seq,
            now,
            self.tracks.len(),
            self.conflicts.len()
        );
    }

    /// Main base of a registered faction.
    pub fn query_base(&self, faction: Faction) -> Option<MainBase> {
        self.tracks
            .get(&faction)
            .filter(|t| t.registered)
            .and_then(|t| t.base)
    }

    /// Forward positions of a faction, sorted by strategic value.
    pub fn query_forward(&self, faction: Faction) -> &[ForwardPosition] {
        self.tracks
            .get(&faction)
            .map(|t| t.forward.as_slice())
            .unwrap_or(&[])
    }

    /// Conflicts from the latest recompute, most important first.
    pub fn detect_raids(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Expansion zones from the latest recompute, most important first.
    pub fn detect_expansion(&self) -> Vec<ActivityZone> {
        let mut zones: Vec<ActivityZone> = self
            .tracks
            .values()
            .flat_map(|t| t.expansions.iter().copied())
            .collect();
        zones.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        zones
    }

    /// Whether a faction passed the sustained-detection gate.
    pub fn is_registered(&self, faction: Faction) -> bool {
        self.tracks.get(&faction).is_some_and(|t| t.registered)
    }

    /// Registered factions.
    pub fn registered_factions(&self) -> Vec<Faction> {
        self.tracks
            .iter()
            .filter(|(_, t)| t.registered)
            .map(|(f, _)| *f)
            .collect()
    }

    /// Forget everything; called at session end.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.dims = None;
        self.started_at = None;
        self.last_recompute = None;
        self.conflicts.clear();
    }

    /// Build an immutable copy of the current territory.
    pub fn snapshot(&self, session_time: f64) -> TerritorySnapshot {
        let factions = self
            .tracks
            .iter()
            .map(|(faction, track)| {
                (
                    *faction,
                    FactionTerritory {
                        registered: track.registered,
                        base: track.base.filter(|_| track.registered),
                        forward: track.forward.clone(),
                        peak_density: track.peak as f64,
                    },
                )
            })
            .collect();

        TerritorySnapshot {
            seq: self.seq,
            session_time,
            published_at: Utc::now(),
            factions,
            conflicts: self.conflicts.clone(),
            expansions: self.detect_expansion(),
            heatmap: self.heatmap(),
        }
    }

    /// Downsample every faction's field and keep the dominant faction per cell.
    fn heatmap(&self) -> Option<Heatmap> {
        let cell = self.config.heatmap_cell;
        let (w, h) = self.dims?;
        if cell == 0 || self.tracks.is_empty() {
            return None;
        }

        let hw = w.div_ceil(cell);
        let hh = h.div_ceil(cell);
        let mut cells = Vec::with_capacity((hw * hh) as usize);
        for cy in 0..hh {
            for cx in 0..hw {
                let (x0, y0) = ((cx * cell) as usize, (cy * cell) as usize);
                let (x1, y1) = (
                    ((cx + 1) * cell).min(w) as usize,
                    ((cy + 1) * cell).min(h) as usize,
                );
                let dominant = self
                    .tracks
                    .iter()
                    .map(|(f, t)| {
                        let block = t.density.slice(s![y0..y1, x0..x1]);
                        (*f, block.mean().unwrap_or(0.0))
                    })
                    .filter(|(_, v)| *v >= HEATMAP_FLOOR)
                    .max_by(|a, b| a.1.total_cmp(&b.1));
                cells.push(dominant);
            }
        }

        Some(Heatmap {
            width: hw,
            height: hh,
            cell,
            cells,
        })
    }
}

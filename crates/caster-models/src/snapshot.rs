//! Immutable territory snapshots for background readers.
//!
//! The territory model is the only writer. It builds a complete snapshot and
//! publishes it by swapping the whole value, so readers always see either the
//! previous or the next snapshot, never a mix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ActivityZone, Conflict, Faction, ForwardPosition, MainBase};

/// Territory state for a single faction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FactionTerritory {
    /// Whether the faction passed the sustained-detection gate
    pub registered: bool,
    pub base: Option<MainBase>,
    /// Sorted descending by strategic value
    pub forward: Vec<ForwardPosition>,
    /// Peak smoothed density this cycle
    pub peak_density: f64,
}

/// Downsampled combined density heatmap, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub width: u32,
    pub height: u32,
    /// Cell size in map pixels
    pub cell: u32,
    /// Per-cell dominant faction and its density
    pub cells: Vec<Option<(Faction, f32)>>,
}

impl Heatmap {
    /// Cell value at `(x, y)`.
    pub fn get(&self, x: u32, y: u32) -> Option<(Faction, f32)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells
            .get((y * self.width + x) as usize)
            .copied()
            .flatten()
    }
}

/// Complete territory state at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritorySnapshot {
    /// Monotonic sequence number, bumped on every recompute
    pub seq: u64,
    /// Session time of the recompute
    pub session_time: f64,
    /// Wall-clock time of the recompute
    pub published_at: DateTime<Utc>,
    pub factions: BTreeMap<Faction, FactionTerritory>,
    /// Sorted descending by importance
    pub conflicts: Vec<Conflict>,
    pub expansions: Vec<ActivityZone>,
    pub heatmap: Option<Heatmap>,
}

impl TerritorySnapshot {
    /// Snapshot with no territory, used before the first recompute.
    pub fn empty() -> Self {
        Self {
            seq: 0,
            session_time: 0.0,
            published_at: Utc::now(),
            factions: BTreeMap::new(),
            conflicts: Vec::new(),
            expansions: Vec::new(),
            heatmap: None,
        }
    }

    /// Factions that passed registration.
    pub fn registered_factions(&self) -> impl Iterator<Item = Faction> + '_ {
        self.factions
            .iter()
            .filter(|(_, t)| t.registered)
            .map(|(f, _)| *f)
    }
}

impl Default for TerritorySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

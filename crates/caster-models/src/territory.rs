//! Territory records produced by the territory model and activity detector.

use serde::{Deserialize, Serialize};

use crate::{Faction, Point};

/// A faction's inferred main base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MainBase {
    /// Base location in map coordinates
    pub position: Point,
    /// Large-kernel density at the base (0.0-1.0)
    pub confidence: f64,
}

/// A connected region of strong presence away from the main base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardPosition {
    /// Region centroid
    pub position: Point,
    /// Region area in cells
    pub area: f64,
    /// Distance from the owning faction's main base
    pub distance_from_base: f64,
    /// `(distance / min_distance) * (area / reference_area)`
    pub strategic_value: f64,
}

/// Origin of an activity zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    /// Frame-to-frame pixel change
    Activity,
    /// Newly grown territory
    Expansion,
}

/// A short-lived area of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityZone {
    /// Zone centroid
    pub position: Point,
    /// Zone area in pixels (or density cells for expansions)
    pub area: f64,
    /// Capped importance (0.0-1.0)
    pub importance: f64,
    /// Session time in seconds when the zone was produced
    pub timestamp: f64,
    /// What produced the zone
    pub kind: ZoneKind,
    /// Owning faction, known for expansions only
    pub faction: Option<Faction>,
}

impl ActivityZone {
    /// Create a generic activity zone.
    pub fn activity(position: Point, area: f64, importance: f64, timestamp: f64) -> Self {
        Self {
            position,
            area,
            importance,
            timestamp,
            kind: ZoneKind::Activity,
            faction: None,
        }
    }

    /// Create an expansion zone owned by `faction`.
    pub fn expansion(
        faction: Faction,
        position: Point,
        area: f64,
        importance: f64,
        timestamp: f64,
    ) -> Self {
        Self {
            position,
            area,
            importance,
            timestamp,
            kind: ZoneKind::Expansion,
            faction: Some(faction),
        }
    }
}

/// One faction's presence inside another faction's territory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Location of the attacker's strongest presence near the defended position
    pub position: Point,
    pub attacker: Faction,
    pub defender: Faction,
    /// Combined, capped importance (0.0-1.0)
    pub importance: f64,
}

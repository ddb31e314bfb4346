//! Camera candidates and view targets.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Faction, Point};

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Raid or conflict from the territory model
    Raid,
    /// Expansion zone from the territory model
    Expansion,
    /// Forward position being monitored
    Forward,
    /// Generic activity zone from frame differencing
    Activity,
}

/// Scheduling class of a chosen view, highest priority first.
///
/// The derived ordering places `Critical` lowest so that `a < b` reads as
/// "a outranks b"; use [`PriorityClass::rank`] for explicit comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// High-importance raid/conflict, always selected
    Critical,
    /// Medium-importance raid
    Raid,
    /// Territory expansion
    Expansion,
    /// Forward-position monitoring
    Forward,
    /// Generic activity from the viewing queue
    Activity,
}

impl PriorityClass {
    /// Numeric rank, 0 = highest priority.
    pub fn rank(&self) -> u8 {
        match self {
            PriorityClass::Critical => 0,
            PriorityClass::Raid => 1,
            PriorityClass::Expansion => 2,
            PriorityClass::Forward => 3,
            PriorityClass::Activity => 4,
        }
    }

    /// Returns true when `self` strictly outranks `other`.
    pub fn outranks(&self, other: &PriorityClass) -> bool {
        self.rank() < other.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityClass::Critical => "critical",
            PriorityClass::Raid => "raid",
            PriorityClass::Expansion => "expansion",
            PriorityClass::Forward => "forward",
            PriorityClass::Activity => "activity",
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A possible camera destination offered to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewCandidate {
    pub position: Point,
    pub kind: CandidateKind,
    /// Importance (0.0-1.0); for forward positions the normalized strategic value
    pub importance: f64,
    /// Faction the candidate concerns, if any
    pub faction: Option<Faction>,
}

impl ViewCandidate {
    /// Create a new candidate.
    pub fn new(position: Point, kind: CandidateKind, importance: f64) -> Self {
        Self {
            position,
            kind,
            importance,
            faction: None,
        }
    }

    /// Attach the faction the candidate concerns.
    pub fn with_faction(mut self, faction: Faction) -> Self {
        self.faction = Some(faction);
        self
    }
}

/// The single active camera target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTarget {
    /// Monotonic id; a new id means the camera must move
    pub id: u64,
    pub position: Point,
    pub priority_class: PriorityClass,
    pub importance: f64,
    /// Session time the target was chosen
    pub chosen_at: f64,
    /// Session time until which the target is held (always >= `chosen_at`)
    pub hold_until: f64,
    /// Chosen by forced rotation rather than priority
    pub forced: bool,
}

impl ViewTarget {
    /// Whether the hold is still in effect at `now`.
    pub fn is_held(&self, now: f64) -> bool {
        now < self.hold_until
    }
}

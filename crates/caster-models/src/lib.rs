//! Shared data models for the autocaster spectating engine.
//!
//! This crate provides Serde-serializable types for:
//! - Map geometry (points, rectangles, the playable region)
//! - Factions and their territory records
//! - Camera candidates and view targets
//! - Session lifecycle states and the transition table
//! - Territory snapshots published to background observers

pub mod faction;
pub mod geometry;
pub mod session;
pub mod snapshot;
pub mod territory;
pub mod view;

// Re-export common types
pub use faction::{Faction, FactionParseError};
pub use geometry::{PlayableRegion, Point, Rect};
pub use session::{MatchInfo, SessionId, SessionState};
pub use snapshot::{FactionTerritory, Heatmap, TerritorySnapshot};
pub use territory::{ActivityZone, Conflict, ForwardPosition, MainBase, ZoneKind};
pub use view::{CandidateKind, PriorityClass, ViewCandidate, ViewTarget};

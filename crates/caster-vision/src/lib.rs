#![deny(unreachable_patterns)]
//! Overhead-map perception for the autocaster engine.
//!
//! This crate provides:
//! - `Frame`, an owned RGB snapshot of the tracked map region
//! - Presence extraction against a typed per-faction classification table
//! - Density-field smoothing and connected-region analysis
//! - The territory model (bases, forward positions, raids, expansions)
//! - Frame-differencing activity detection
//!
//! # Architecture
//!
//! ```text
//! Frame
//!   │
//!   ├──────────────────────────┐
//!   ▼                          ▼
//! ┌────────────────────┐  ┌───────────────────┐
//! │ Presence Extractor │  │ Activity Detector │ ← prev/curr diff
//! └─────────┬──────────┘  └─────────┬─────────┘
//!           ▼                       │
//! ┌────────────────────┐            │
//! │  Territory Model   │ ← density, bases, raids, expansions
//! └─────────┬──────────┘            │
//!           ▼                       ▼
//!      TerritorySnapshot      [ActivityZone]
//! ```

pub mod activity;
pub mod components;
pub mod density;
pub mod error;
pub mod frame;
pub mod presence;
pub mod territory;

pub use activity::{ActivityConfig, ActivityDetector};
pub use error::{VisionError, VisionResult};
pub use frame::Frame;
pub use presence::{
    ClassificationRule, ClassificationTable, PresenceExtractor, PresenceMap, PresenceMask,
};
pub use territory::{TerritoryConfig, TerritoryModel, TerritoryUpdate};

//! Faction identities.
//!
//! Factions are told apart on the overhead map purely by their marker color,
//! so the set of factions is the closed set of player colors the game uses.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A player/side on the map, identified by its marker color.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Red,
    Blue,
    Teal,
    Purple,
    Yellow,
    Orange,
    Green,
    Pink,
}

impl Faction {
    /// All factions, in slot order.
    pub const ALL: &'static [Faction] = &[
        Faction::Red,
        Faction::Blue,
        Faction::Teal,
        Faction::Purple,
        Faction::Yellow,
        Faction::Orange,
        Faction::Green,
        Faction::Pink,
    ];

    /// Returns the faction name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Faction::Red => "red",
            Faction::Blue => "blue",
            Faction::Teal => "teal",
            Faction::Purple => "purple",
            Faction::Yellow => "yellow",
            Faction::Orange => "orange",
            Faction::Green => "green",
            Faction::Pink => "pink",
        }
    }

    /// Nominal marker color, used when rendering heatmaps.
    pub fn display_rgb(&self) -> [u8; 3] {
        match self {
            Faction::Red => [255, 3, 3],
            Faction::Blue => [0, 66, 255],
            Faction::Teal => [28, 230, 185],
            Faction::Purple => [84, 0, 129],
            Faction::Yellow => [255, 252, 1],
            Faction::Orange => [254, 138, 14],
            Faction::Green => [32, 192, 0],
            Faction::Pink => [229, 91, 176],
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Faction {
    type Err = FactionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "red" => Ok(Faction::Red),
            "blue" => Ok(Faction::Blue),
            "teal" | "cyan" => Ok(Faction::Teal),
            "purple" => Ok(Faction::Purple),
            "yellow" => Ok(Faction::Yellow),
            "orange" => Ok(Faction::Orange),
            "green" => Ok(Faction::Green),
            "pink" => Ok(Faction::Pink),
            _ => Err(FactionParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown faction: {0}")]
pub struct FactionParseError(String);

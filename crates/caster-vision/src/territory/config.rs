//! Configuration for the territory model.
//!
//! Thresholds are resolution dependent; the defaults suit a minimap capture
//! of roughly 200-300 pixels on a side.

use serde::{Deserialize, Serialize};

/// Configuration for the territory model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerritoryConfig {
    // === Cadence ===
    /// Minimum seconds between density recomputes (default: 1.0)
    pub recompute_interval: f64,

    // === Density Field ===
    /// Box-kernel radius for per-frame spatial smoothing (default: 2)
    pub smoothing_radius: usize,
    /// EMA weight of the newest frame (default: 0.35)
    pub temporal_alpha: f32,

    // === Registration ===
    /// Consecutive recomputes with presence before a faction is registered (default: 3)
    pub registration_updates: u32,
    /// Minimum presence pixels for a recompute to count towards registration (default: 12)
    pub registration_min_pixels: usize,

    // === Main Base ===
    /// Larger box-kernel radius used to locate the base (default: 6)
    pub base_kernel_radius: usize,
    /// Minimum large-kernel density for a base (default: 0.25)
    pub base_density_floor: f32,
    /// Density margin a new peak must exceed the old base by before it moves (default: 0.15)
    pub base_hysteresis: f32,

    // === Forward Positions ===
    /// Density threshold for forward-position regions (default: 0.5)
    pub forward_threshold: f32,
    /// Minimum region area in cells (default: 6)
    pub forward_min_area: usize,
    /// Regions closer than this to the base are part of the base (default: 25.0)
    pub forward_min_distance: f64,
    /// Reference area for strategic value (default: 40.0)
    pub forward_reference_area: f64,
    /// Maximum distance as a fraction of the map diagonal (default: 0.7)
    pub forward_max_diagonal_fraction: f64,
    /// Forward positions kept per faction (default: 5)
    pub max_forward_positions: usize,

    // === Raids ===
    /// Sampling radius around defended positions (default: 30.0)
    pub raid_radius: f64,
    /// Attacker peak density that triggers a conflict (default: 0.4)
    pub raid_density_threshold: f32,
    /// Density above which a cell counts towards the unit-count proxy (default: 0.1)
    pub raid_presence_floor: f32,
    /// Cell count treated as a full-strength raid (default: 80.0)
    pub raid_count_reference: f64,
    /// Weight of the unit-count term (default: 0.4)
    pub raid_weight_count: f64,
    /// Weight of the peak-density term (default: 0.35)
    pub raid_weight_peak: f64,
    /// Weight of the average-density term (default: 0.25)
    pub raid_weight_mean: f64,
    /// Length of the early-game phase in seconds (default: 300.0)
    pub early_game_duration: f64,
    /// Importance multiplier during the early game (default: 1.3)
    pub early_game_boost: f64,

    // === Expansion ===
    /// Density increase per recompute that marks new territory (default: 0.3)
    pub expansion_threshold: f32,
    /// Grouping radius for expansion cells (default: 8.0)
    pub expansion_group_radius: f64,
    /// Minimum cells per expansion cluster (default: 10)
    pub expansion_min_cells: usize,
    /// Importance assigned to expansion zones (default: 0.5)
    pub expansion_importance: f64,

    // === Snapshot ===
    /// Heatmap cell size in pixels, 0 disables the heatmap (default: 4)
    pub heatmap_cell: u32,
}

impl Default for TerritoryConfig {
    fn default() -> Self {
        Self {
            recompute_interval: 1.0,

            smoothing_radius: 2,
            temporal_alpha: 0.35,

            registration_updates: 3,
            registration_min_pixels: 12,

            base_kernel_radius: 6,
            base_density_floor: 0.25,
            base_hysteresis: 0.15,

            forward_threshold: 0.5,
            forward_min_area: 6,
            forward_min_distance: 25.0,
            forward_reference_area: 40.0,
            forward_max_diagonal_fraction: 0.7,
            max_forward_positions: 5,

            raid_radius: 30.0,
            raid_density_threshold: 0.4,
            raid_presence_floor: 0.1,
            raid_count_reference: 80.0,
            raid_weight_count: 0.4,
            raid_weight_peak: 0.35,
            raid_weight_mean: 0.25,
            early_game_duration: 300.0,
            early_game_boost: 1.3,

            expansion_threshold: 0.3,
            expansion_group_radius: 8.0,
            expansion_min_cells: 10,
            expansion_importance: 0.5,

            heatmap_cell: 4,
        }
    }
}

impl TerritoryConfig {
    /// Validation errors as human-readable strings.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(self.temporal_alpha > 0.0 && self.temporal_alpha <= 1.0) {
            problems.push(format!("temporal_alpha {} not in (0, 1]", self.temporal_alpha));
        }
        if self.forward_min_distance <= 0.0 {
            problems.push("forward_min_distance must be positive".to_string());
        }
        if self.forward_reference_area <= 0.0 || self.raid_count_reference <= 0.0 {
            problems.push("reference areas must be positive".to_string());
        }
        if self.raid_radius <= 0.0 {
            problems.push("raid_radius must be positive".to_string());
        }
        if self.recompute_interval < 0.0 {
            problems.push("recompute_interval must not be negative".to_string());
        }
        problems
    }
}

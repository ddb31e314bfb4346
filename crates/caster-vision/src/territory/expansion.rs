//! Expansion detection by differencing consecutive density fields.

use caster_models::{ActivityZone, Faction, Point};
use ndarray::Array2;

use super::config::TerritoryConfig;
use crate::components::cluster_points;

/// Clusters of newly grown density for one faction.
pub(crate) fn detect(
    faction: Faction,
    current: &Array2<f32>,
    previous: Option<&Array2<f32>>,
    config: &TerritoryConfig,
    now: f64,
) -> Vec<ActivityZone> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    if previous.dim() != current.dim() {
        return Vec::new();
    }

    let grown: Vec<(Point, f64)> = current
        .indexed_iter()
        .filter_map(|((y, x), v)| {
            let increase = v - previous[[y, x]];
            (increase > config.expansion_threshold)
                .then(|| (Point::new(x as f64, y as f64), increase as f64))
        })
        .collect();

    if grown.len() < config.expansion_min_cells {
        return Vec::new();
    }

    cluster_points(&grown, config.expansion_group_radius)
        .into_iter()
        .filter(|c| c.members >= config.expansion_min_cells)
        .map(|c| {
            ActivityZone::expansion(
                faction,
                c.centroid,
                c.members as f64,
                config.expansion_importance,
                now,
            )
        })
        .collect()
}

//! Main-base and forward-position inference.

use caster_models::{ForwardPosition, MainBase};
use ndarray::Array2;
use tracing::debug;

use super::config::TerritoryConfig;
use crate::components::{connected_regions, threshold};
use crate::density::{box_blur, peak_centroid, value_at};

/// Plateau tolerance when locating the wide-kernel peak.
const PEAK_TOLERANCE: f32 = 1e-4;

/// Locate the main base, honouring the hysteresis band around an existing one.
///
/// Once established a base is never dropped; it only moves when the new
/// peak beats the density at the old location by more than the band.
pub(crate) fn infer_base(
    density: &Array2<f32>,
    current: Option<MainBase>,
    config: &TerritoryConfig,
) -> Option<MainBase> {
    let wide = box_blur(density, config.base_kernel_radius);
    let peak = peak_centroid(&wide, config.base_kernel_radius, PEAK_TOLERANCE);

    match (current, peak) {
        (None, Some((position, value))) if value >= config.base_density_floor => Some(MainBase {
            position,
            confidence: value as f64,
        }),
        (None, _) => None,
        (Some(base), Some((position, value)))
            if value >= config.base_density_floor
                && value > value_at(&wide, base.position) + config.base_hysteresis =>
        {
            debug!(
                "Main base moved from ({:.1}, {:.1}) to ({:.1}, {:.1}), density {:.2}",
                base.position.x, base.position.y, position.x, position.y, value
            );
            Some(MainBase {
                position,
                confidence: value as f64,
            })
        }
        (Some(base), _) => Some(MainBase {
            position: base.position,
            confidence: value_at(&wide, base.position) as f64,
        }),
    }
}

/// Recompute forward positions from scratch, sorted by strategic value.
pub(crate) fn forward_positions(
    density: &Array2<f32>,
    base: &MainBase,
    config: &TerritoryConfig,
    map_diagonal: f64,
) -> Vec<ForwardPosition> {
    let mask = threshold(density, config.forward_threshold);
    let max_distance = config.forward_max_diagonal_fraction * map_diagonal;

    let mut positions: Vec<ForwardPosition> = connected_regions(&mask, config.forward_min_area)
        .into_iter()
        .filter_map(|region| {
            let distance = region.centroid.distance(&base.position);
            if distance <= config.forward_min_distance || distance >= max_distance {
                return None;
            }
            let area = region.area as f64;
            Some(ForwardPosition {
                position: region.centroid,
                area,
                distance_from_base: distance,
                strategic_value: (distance / config.forward_min_distance)
                    * (area / config.forward_reference_area),
            })
        })
        .collect();

    positions.sort_by(|a, b| b.strategic_value.total_cmp(&a.strategic_value));
    positions.truncate(config.max_forward_positions);
    positions
}

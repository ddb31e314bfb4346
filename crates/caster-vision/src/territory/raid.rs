//! Raid and conflict detection.
//!
//! For each ordered (attacker, defender) pair the attacker's smoothed
//! presence is sampled around every position the defender holds. A peak
//! above the raid threshold becomes a `Conflict` whose importance combines a
//! unit-count proxy, the peak density and the average density, each capped
//! at 1.0 before weighting.

use std::collections::BTreeMap;

use caster_models::{Conflict, Faction, Point};

use super::config::TerritoryConfig;
use super::FactionTrack;
use crate::density::{sample_disc, DiscStats};

/// Importance of a sampled raid.
pub(crate) fn raid_importance(stats: &DiscStats, config: &TerritoryConfig, boost: f64) -> f64 {
    let count = (stats.cells_above_floor as f64 / config.raid_count_reference).min(1.0);
    let peak = (stats.peak as f64).min(1.0);
    let mean = (stats.mean_above_floor as f64).min(1.0);
    let weighted = config.raid_weight_count * count
        + config.raid_weight_peak * peak
        + config.raid_weight_mean * mean;
    (weighted * boost).clamp(0.0, 1.0)
}

/// Every conflict currently on the map, most important first.
pub(crate) fn detect(
    tracks: &BTreeMap<Faction, FactionTrack>,
    config: &TerritoryConfig,
    boost: f64,
) -> Vec<Conflict> {
    let mut conflicts: Vec<Conflict> = Vec::new();

    for (defender, defending) in tracks {
        let Some(base) = defending.base.filter(|_| defending.registered) else {
            continue;
        };
        let held: Vec<Point> = std::iter::once(base.position)
            .chain(defending.forward.iter().map(|f| f.position))
            .collect();

        for (attacker, attacking) in tracks {
            if attacker == defender {
                continue;
            }
            for position in &held {
                let stats = sample_disc(
                    &attacking.density,
                    *position,
                    config.raid_radius,
                    config.raid_presence_floor,
                );
                if stats.peak <= config.raid_density_threshold {
                    continue;
                }
                let conflict = Conflict {
                    position: stats.peak_at,
                    attacker: *attacker,
                    defender: *defender,
                    importance: raid_importance(&stats, config, boost),
                };
                merge(&mut conflicts, conflict, config.raid_radius / 2.0);
            }
        }
    }

    conflicts.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    conflicts
}

/// Overlapping discs see the same attacker blob; keep the stronger reading.
fn merge(conflicts: &mut Vec<Conflict>, conflict: Conflict, radius: f64) {
    let duplicate = conflicts.iter_mut().find(|c| {
        c.attacker == conflict.attacker
            && c.defender == conflict.defender
            && c.position.is_near(&conflict.position, radius)
    });
    match duplicate {
        Some(existing) if existing.importance < conflict.importance => *existing = conflict,
        Some(_) => {}
        None => conflicts.push(conflict),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raid_importance_terms_are_capped() {
        let config = TerritoryConfig::default();
        let stats = DiscStats {
            cells_above_floor: 10_000,
            peak: 3.0,
            peak_at: Point::default(),
            mean_above_floor: 2.0,
        };
        assert!((raid_importance(&stats, &config, 1.0) - 1.0).abs() < 1e-9);
        assert!(raid_importance(&stats, &config, 5.0) <= 1.0);
    }

    #[test]
    fn test_early_game_boost_raises_small_raids() {
        let config = TerritoryConfig::default();
        let stats = DiscStats {
            cells_above_floor: 8,
            peak: 0.5,
            peak_at: Point::default(),
            mean_above_floor: 0.3,
        };
        let late = raid_importance(&stats, &config, 1.0);
        let early = raid_importance(&stats, &config, config.early_game_boost);
        assert!(early > late);
    }

    #[test]
    fn test_merge_keeps_stronger_duplicate() {
        let mut conflicts = Vec::new();
        let weak = Conflict {
            position: Point::new(10.0, 10.0),
            attacker: Faction::Blue,
            defender: Faction::Red,
            importance: 0.4,
        };
        let strong = Conflict {
            position: Point::new(12.0, 10.0),
            importance: 0.8,
            ..weak
        };
        merge(&mut conflicts, weak, 15.0);
        merge(&mut conflicts, strong, 15.0);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].importance, 0.8);
    }
}

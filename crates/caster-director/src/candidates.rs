//! Turns territory snapshots and activity zones into camera candidates.

use caster_models::{ActivityZone, CandidateKind, TerritorySnapshot, ViewCandidate, ZoneKind};

/// Every candidate the scheduler should consider this tick.
///
/// Forward positions are squashed into `[0, 1)` by strategic value so they
/// compare with the capped importances of the other kinds.
pub fn gather(snapshot: &TerritorySnapshot, activity: &[ActivityZone]) -> Vec<ViewCandidate> {
    let mut candidates = Vec::new();

    for conflict in &snapshot.conflicts {
        candidates.push(
            ViewCandidate::new(conflict.position, CandidateKind::Raid, conflict.importance)
                .with_faction(conflict.attacker),
        );
    }

    for zone in snapshot.expansions.iter().chain(activity.iter()) {
        let kind = match zone.kind {
            ZoneKind::Expansion => CandidateKind::Expansion,
            ZoneKind::Activity => CandidateKind::Activity,
        };
        let candidate = ViewCandidate::new(zone.position, kind, zone.importance);
        candidates.push(match zone.faction {
            Some(faction) => candidate.with_faction(faction),
            None => candidate,
        });
    }

    for (faction, territory) in snapshot.factions.iter().filter(|(_, t)| t.registered) {
        for forward in &territory.forward {
            let value = forward.strategic_value.max(0.0);
            candidates.push(
                ViewCandidate::new(forward.position, CandidateKind::Forward, value / (1.0 + value))
                    .with_faction(*faction),
            );
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use caster_models::{Conflict, Faction, FactionTerritory, ForwardPosition, Point};

    fn forward(x: f64, value: f64) -> ForwardPosition {
        ForwardPosition {
            position: Point::new(x, 10.0),
            area: 12.0,
            distance_from_base: 50.0,
            strategic_value: value,
        }
    }

    #[test]
    fn test_gathers_every_kind() {
        let mut snapshot = TerritorySnapshot::empty();
        snapshot.conflicts.push(Conflict {
            position: Point::new(5.0, 5.0),
            attacker: Faction::Blue,
            defender: Faction::Red,
            importance: 0.9,
        });
        snapshot.expansions.push(ActivityZone::expansion(
            Faction::Red,
            Point::new(40.0, 40.0),
            36.0,
            0.5,
            1.0,
        ));
        snapshot.factions.insert(
            Faction::Red,
            FactionTerritory {
                registered: true,
                forward: vec![forward(60.0, 3.0), forward(80.0, 1.0)],
                ..Default::default()
            },
        );
        snapshot.factions.insert(
            Faction::Green,
            FactionTerritory {
                registered: false,
                forward: vec![forward(90.0, 9.0)],
                ..Default::default()
            },
        );
        let activity = [ActivityZone::activity(Point::new(20.0, 20.0), 30.0, 0.5, 1.0)];

        let candidates = gather(&snapshot, &activity);
        let kinds: Vec<CandidateKind> = candidates.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CandidateKind::Raid,
                CandidateKind::Expansion,
                CandidateKind::Activity,
                CandidateKind::Forward,
                CandidateKind::Forward,
            ]
        );
        assert_eq!(candidates[0].faction, Some(Faction::Blue));
        assert_eq!(candidates[1].faction, Some(Faction::Red));
        assert_eq!(candidates[2].faction, None);
        assert!((candidates[3].importance - 0.75).abs() < 1e-9);
        assert!((candidates[4].importance - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot_yields_only_activity() {
        let activity = [ActivityZone::activity(Point::new(1.0, 1.0), 10.0, 0.2, 0.0)];
        let candidates = gather(&TerritorySnapshot::empty(), &activity);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, CandidateKind::Activity);
    }
}

//! View scheduler configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the view scheduler.
///
/// Times are session seconds; distances are frame pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    // === Priority Tiers ===
    /// Raid importance at or above which a raid is always selected (default: 0.8)
    pub critical_threshold: f64,
    /// Raid importance at or above which a raid joins the weighted raid tier (default: 0.4)
    pub raid_threshold: f64,
    /// Probability the medium raid tier fires when raids exist (default: 0.7)
    pub raid_probability: f64,
    /// Probability the expansion tier fires when expansions exist (default: 0.5)
    pub expansion_probability: f64,
    /// Forward positions per faction eligible for monitoring (default: 3)
    pub forward_top_k: usize,

    // === Activity Queue ===
    /// Minimum importance for an activity zone to be queued (default: 0.15)
    pub activity_floor: f64,
    /// Maximum queued activity zones; oldest evicted first (default: 16)
    pub queue_capacity: usize,
    /// Seconds a queued zone stays valid (default: 10.0)
    pub queue_ttl: f64,

    // === Anti-Repetition ===
    /// Radius within which two positions count as the same view (default: 40.0)
    pub proximity_radius: f64,
    /// Seconds before a chosen area may be chosen again (default: 20.0)
    pub min_revisit_interval: f64,

    // === Dwell ===
    /// Minimum hold for a chosen target (default: 4.0)
    pub min_dwell: f64,
    /// Maximum hold for a chosen target (default: 8.0)
    pub max_dwell: f64,
    /// Time in one area after which a different view is forced (default: 30.0)
    pub max_dwell_ceiling: f64,
    /// Hold for a forced rotation target, during which nothing preempts (default: 3.0)
    pub forced_hold: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 0.8,
            raid_threshold: 0.4,
            raid_probability: 0.7,
            expansion_probability: 0.5,
            forward_top_k: 3,

            activity_floor: 0.15,
            queue_capacity: 16,
            queue_ttl: 10.0,

            proximity_radius: 40.0,
            min_revisit_interval: 20.0,

            min_dwell: 4.0,
            max_dwell: 8.0,
            max_dwell_ceiling: 30.0,
            forced_hold: 3.0,
        }
    }
}

impl SchedulerConfig {
    /// Long holds, rare raid cuts. Suits slow macro games.
    pub fn calm() -> Self {
        Self {
            raid_probability: 0.5,
            expansion_probability: 0.35,
            min_dwell: 8.0,
            max_dwell: 14.0,
            max_dwell_ceiling: 45.0,
            forced_hold: 5.0,
            min_revisit_interval: 30.0,
            ..Default::default()
        }
    }

    /// Short holds, eager raid and expansion coverage.
    pub fn action() -> Self {
        Self {
            critical_threshold: 0.7,
            raid_probability: 0.9,
            expansion_probability: 0.7,
            min_dwell: 2.5,
            max_dwell: 5.0,
            max_dwell_ceiling: 20.0,
            forced_hold: 2.0,
            min_revisit_interval: 12.0,
            queue_ttl: 6.0,
            ..Default::default()
        }
    }

    /// Validation errors as human-readable strings.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(self.min_dwell >= 0.0 && self.min_dwell <= self.max_dwell) {
            problems.push(format!(
                "dwell bounds [{}, {}] are not ordered",
                self.min_dwell, self.max_dwell
            ));
        }
        if self.max_dwell_ceiling < self.max_dwell {
            problems.push("max_dwell_ceiling must not be below max_dwell".to_string());
        }
        if self.forced_hold < 0.0 {
            problems.push("forced_hold must not be negative".to_string());
        }
        for (name, p) in [
            ("raid_probability", self.raid_probability),
            ("expansion_probability", self.expansion_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                problems.push(format!("{} {} not in [0, 1]", name, p));
            }
        }
        if self.raid_threshold > self.critical_threshold {
            problems.push("raid_threshold must not exceed critical_threshold".to_string());
        }
        if self.proximity_radius < 0.0 || self.min_revisit_interval < 0.0 {
            problems.push("revisit radius and interval must not be negative".to_string());
        }
        if self.queue_capacity == 0 {
            problems.push("queue_capacity must be at least 1".to_string());
        }
        problems
    }
}

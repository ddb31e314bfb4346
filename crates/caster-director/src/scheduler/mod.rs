//! View scheduler.
//!
//! Merges territory, conflict and activity signals into one camera target.
//!
//! Tiers, highest priority first:
//! 1. Critical raid (importance >= `critical_threshold`): always selected,
//!    preempts any lower-class hold
//! 2. Medium raid: fires with `raid_probability`, then picks weighted by importance
//! 3. Expansion: fires with `expansion_probability`, uniform pick
//! 4. Forward position: round-robin across factions, random among the top K
//! 5. Queued activity: oldest eligible entry of the bounded FIFO
//!
//! When every tier declines the highest-class eligible candidate is taken.
//! Activity below `activity_floor` is dropped before any tier runs.
//! Candidates near a recently chosen position are suppressed throughout.

pub mod config;
pub mod history;
pub mod queue;


pub use config::SchedulerConfig;

use std::collections::BTreeMap;

use caster_models::{
    CandidateKind, Faction, PlayableRegion, PriorityClass, ViewCandidate, ViewTarget,
};
use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use history::{Fixation, RevisitHistory};
use queue::ActivityQueue;

/// Chooses where the camera looks next.
pub struct ViewScheduler {
    config: SchedulerConfig,
    region: PlayableRegion,
    rng: StdRng,
    history: RevisitHistory,
    queue: ActivityQueue,
    fixation: Fixation,
    current: Option<ViewTarget>,
    next_id: u64,
    /// Faction group served last by the forward tier
    forward_cursor: Option<Option<Faction>>,
}

impl ViewScheduler {
    /// Create a scheduler seeded from the OS.
    pub fn new(config: SchedulerConfig, region: PlayableRegion) -> Self {
        Self::with_rng(config, region, StdRng::from_os_rng())
    }

    /// Create a scheduler with an explicit RNG (seeded in tests).
    pub fn with_rng(config: SchedulerConfig, region: PlayableRegion, rng: StdRng) -> Self {
        let history = RevisitHistory::new(config.proximity_radius, config.min_revisit_interval);
        let queue = ActivityQueue::new(
            config.queue_capacity,
            config.queue_ttl,
            config.proximity_radius,
        );
        Self {
            config,
            region,
            rng,
            history,
            queue,
            fixation: Fixation::default(),
            current: None,
            next_id: 0,
            forward_cursor: None,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn region(&self) -> &PlayableRegion {
        &self.region
    }

    /// Replace the playable region; queued activity is dropped.
    pub fn set_region(&mut self, region: PlayableRegion) {
        self.region = region;
        self.queue.clear();
        if let Some(current) = self.current {
            if !self.region.contains(&current.position) {
                self.current = None;
            }
        }
    }

    /// The active target, if any.
    pub fn current(&self) -> Option<ViewTarget> {
        self.current
    }

    /// Number of queued activity zones.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Forget every choice; called between sessions.
    pub fn reset(&mut self) {
        self.history.clear();
        self.queue.clear();
        self.fixation.reset();
        self.current = None;
        self.forward_cursor = None;
    }

    /// Next camera target at session time `now`.
    ///
    /// While the active target is held the same target (same `id`) is
    /// returned, unless a critical raid preempts it or the view has stayed in
    /// one area beyond `max_dwell_ceiling`. Returns `None` only before the
    /// first choice.
    pub fn next_view(&mut self, candidates: &[ViewCandidate], now: f64) -> Option<ViewTarget> {
        self.history.prune(now);
        self.queue.expire(now);

        // Activity under the floor is never shown, not even as a fallback.
        let floor = self.config.activity_floor;
        let valid: Vec<ViewCandidate> = candidates
            .iter()
            .copied()
            .filter(|c| c.importance.is_finite() && self.region.contains(&c.position))
            .filter(|c| c.kind != CandidateKind::Activity || c.importance >= floor)
            .collect();

        for candidate in valid.iter().filter(|c| c.kind == CandidateKind::Activity) {
            if !self.history.is_suppressed(&candidate.position, now) {
                self.queue.push(*candidate, now);
            }
        }

        let eligible: Vec<ViewCandidate> = valid
            .into_iter()
            .filter(|c| !self.history.is_suppressed(&c.position, now))
            .collect();

        if let Some(current) = self.current {
            if current.forced && current.is_held(now) {
                return Some(current);
            }
            if self.fixation.duration(now) > self.config.max_dwell_ceiling {
                return Some(self.force_rotation(&eligible, current, now));
            }
            if current.is_held(now) {
                if current.priority_class != PriorityClass::Critical {
                    if let Some(critical) = self.pick_critical(&eligible) {
                        debug!(
                            "Critical raid at ({:.0}, {:.0}) preempts {} view",
                            critical.position.x, critical.position.y, current.priority_class
                        );
                        return Some(self.commit(critical, PriorityClass::Critical, false, now));
                    }
                }
                return Some(current);
            }
        }

        match self.select(&eligible, now) {
            Some((candidate, class)) => Some(self.commit(candidate, class, false, now)),
            None => self.current,
        }
    }

    /// Scheduling class a candidate would be shown under.
    pub fn class_of(&self, candidate: &ViewCandidate) -> PriorityClass {
        match candidate.kind {
            CandidateKind::Raid if candidate.importance >= self.config.critical_threshold => {
                PriorityClass::Critical
            }
            CandidateKind::Raid => PriorityClass::Raid,
            CandidateKind::Expansion => PriorityClass::Expansion,
            CandidateKind::Forward => PriorityClass::Forward,
            CandidateKind::Activity => PriorityClass::Activity,
        }
    }

    fn select(
        &mut self,
        eligible: &[ViewCandidate],
        now: f64,
    ) -> Option<(ViewCandidate, PriorityClass)> {
        if let Some(critical) = self.pick_critical(eligible) {
            return Some((critical, PriorityClass::Critical));
        }

        let raids: Vec<ViewCandidate> = eligible
            .iter()
            .filter(|c| {
                self.class_of(c) == PriorityClass::Raid
                    && c.importance >= self.config.raid_threshold
            })
            .copied()
            .collect();
        if !raids.is_empty() && self.roll(self.config.raid_probability) {
            if let Some(raid) = self.weighted_pick(&raids) {
                return Some((raid, PriorityClass::Raid));
            }
        }

        let expansions: Vec<ViewCandidate> = eligible
            .iter()
            .filter(|c| c.kind == CandidateKind::Expansion)
            .copied()
            .collect();
        if !expansions.is_empty() && self.roll(self.config.expansion_probability) {
            if let Some(expansion) = expansions.choose(&mut self.rng) {
                return Some((*expansion, PriorityClass::Expansion));
            }
        }

        if let Some(forward) = self.pick_forward(eligible) {
            return Some((forward, PriorityClass::Forward));
        }

        let history = &self.history;
        let region = &self.region;
        let activity = self.queue.pop_eligible(|c| {
            history.is_suppressed(&c.position, now) || !region.contains(&c.position)
        });
        if let Some(activity) = activity {
            return Some((activity, PriorityClass::Activity));
        }

        self.best_of(eligible.iter()).map(|c| (c, self.class_of(&c)))
    }

    fn pick_critical(&self, eligible: &[ViewCandidate]) -> Option<ViewCandidate> {
        eligible
            .iter()
            .filter(|c| self.class_of(c) == PriorityClass::Critical)
            .max_by(|a, b| a.importance.total_cmp(&b.importance))
            .copied()
    }

    /// Next faction after the last one served, random among its top K.
    fn pick_forward(&mut self, eligible: &[ViewCandidate]) -> Option<ViewCandidate> {
        let mut groups: BTreeMap<Option<Faction>, Vec<ViewCandidate>> = BTreeMap::new();
        for candidate in eligible.iter().filter(|c| c.kind == CandidateKind::Forward) {
            groups.entry(candidate.faction).or_default().push(*candidate);
        }

        let faction = match self.forward_cursor {
            Some(last) => groups
                .keys()
                .find(|k| **k > last)
                .or_else(|| groups.keys().next()),
            None => groups.keys().next(),
        }
        .copied()?;

        let group = groups.get_mut(&faction)?;
        group.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        group.truncate(self.config.forward_top_k.max(1));
        self.forward_cursor = Some(faction);
        group.choose(&mut self.rng).copied()
    }

    /// Highest class first, then highest importance.
    fn best_of<'a>(
        &self,
        candidates: impl Iterator<Item = &'a ViewCandidate>,
    ) -> Option<ViewCandidate> {
        candidates
            .min_by(|a, b| {
                self.class_of(a)
                    .rank()
                    .cmp(&self.class_of(b).rank())
                    .then(b.importance.total_cmp(&a.importance))
            })
            .copied()
    }

    /// Leave the area the view has been stuck in, or keep the current target
    /// when nothing else is available.
    fn force_rotation(
        &mut self,
        eligible: &[ViewCandidate],
        current: ViewTarget,
        now: f64,
    ) -> ViewTarget {
        let anchor = self.fixation.anchor().unwrap_or(current.position);
        let radius = self.config.proximity_radius;
        let elsewhere = self.best_of(eligible.iter().filter(|c| {
            !c.position.is_near(&anchor, radius) && !c.position.is_near(&current.position, radius)
        }));

        match elsewhere {
            Some(candidate) => {
                debug!(
                    "Forcing rotation after {:.1}s near ({:.0}, {:.0})",
                    self.fixation.duration(now),
                    anchor.x,
                    anchor.y
                );
                let class = self.class_of(&candidate);
                self.commit(candidate, class, true, now)
            }
            None => current,
        }
    }

    fn commit(
        &mut self,
        candidate: ViewCandidate,
        class: PriorityClass,
        forced: bool,
        now: f64,
    ) -> ViewTarget {
        let hold = if forced {
            self.config.forced_hold
        } else {
            self.dwell()
        };
        self.next_id += 1;
        let target = ViewTarget {
            id: self.next_id,
            position: candidate.position,
            priority_class: class,
            importance: candidate.importance,
            chosen_at: now,
            hold_until: now + hold.max(0.0),
            forced,
        };

        self.history.record(candidate.position, now);
        self.fixation
            .observe(candidate.position, now, self.config.proximity_radius);
        self.current = Some(target);

        debug!(
            "View #{} -> ({:.0}, {:.0}) class={} importance={:.2} hold={:.1}s{}",
            target.id,
            target.position.x,
            target.position.y,
            class,
            target.importance,
            hold,
            if forced { " forced" } else { "" }
        );
        target
    }

    fn dwell(&mut self) -> f64 {
        let (min, max) = (self.config.min_dwell, self.config.max_dwell);
        if max > min {
            self.rng.random_range(min..=max)
        } else {
            min
        }
    }

    fn roll(&mut self, probability: f64) -> bool {
        probability >= 1.0 || (probability > 0.0 && self.rng.random_range(0.0..1.0) < probability)
    }

    fn weighted_pick(&mut self, candidates: &[ViewCandidate]) -> Option<ViewCandidate> {
        let total: f64 = candidates.iter().map(|c| c.importance.max(0.0)).sum();
        if total <= 0.0 {
            return candidates.first().copied();
        }
        let mut ticket = self.rng.random_range(0.0..total);
        for candidate in candidates {
            let weight = candidate.importance.max(0.0);
            if ticket < weight {
                return Some(*candidate);
            }
            ticket -= weight;
        }
        candidates.last().copied()
    }
}

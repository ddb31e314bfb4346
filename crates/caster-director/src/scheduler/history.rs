//! Revisit suppression and fixation tracking.

use std::collections::VecDeque;

use caster_models::Point;

/// Positions chosen recently, oldest first.
#[derive(Debug, Clone)]
pub struct RevisitHistory {
    entries: VecDeque<(Point, f64)>,
    radius: f64,
    interval: f64,
}

impl RevisitHistory {
    pub fn new(radius: f64, interval: f64) -> Self {
        Self {
            entries: VecDeque::new(),
            radius,
            interval,
        }
    }

    /// Remember that `position` was chosen at `now`.
    pub fn record(&mut self, position: Point, now: f64) {
        self.entries.push_back((position, now));
    }

    /// Forget choices whose cooldown has elapsed.
    pub fn prune(&mut self, now: f64) {
        while let Some((_, at)) = self.entries.front() {
            if now - at < self.interval {
                break;
            }
            self.entries.pop_front();
        }
    }

    /// Whether `position` lies near a position chosen within the cooldown.
    pub fn is_suppressed(&self, position: &Point, now: f64) -> bool {
        self.entries
            .iter()
            .any(|(p, at)| now - at < self.interval && p.is_near(position, self.radius))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// How long consecutive choices have stayed in one area.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fixation {
    anchor: Option<(Point, f64)>,
}

impl Fixation {
    /// Note a new choice; moving out of the anchor's radius starts a new area.
    pub fn observe(&mut self, position: Point, now: f64, radius: f64) {
        match self.anchor {
            Some((anchor, _)) if anchor.is_near(&position, radius) => {}
            _ => self.anchor = Some((position, now)),
        }
    }

    /// Seconds spent in the current area.
    pub fn duration(&self, now: f64) -> f64 {
        self.anchor.map_or(0.0, |(_, since)| now - since)
    }

    pub fn anchor(&self) -> Option<Point> {
        self.anchor.map(|(p, _)| p)
    }

    pub fn reset(&mut self) {
        self.anchor = None;
    }
}

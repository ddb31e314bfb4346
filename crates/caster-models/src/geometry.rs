//! Map geometry in frame pixel coordinates.
//!
//! All positions handled by the engine live in the coordinate space of the
//! captured overhead map: `(0, 0)` is the top-left pixel, `x` grows to the
//! right and `y` grows downwards.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A point on the overhead map.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Returns true when `other` lies within `radius` of this point.
    #[inline]
    pub fn is_near(&self, other: &Point, radius: f64) -> bool {
        self.distance(other) <= radius
    }

    /// Both coordinates are finite numbers.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Rect {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Rectangle width
    pub width: f64,
    /// Rectangle height
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle of the given size centered on `center`.
    pub fn centered(center: Point, width: f64, height: f64) -> Self {
        Self {
            x: center.x - width / 2.0,
            y: center.y - height / 2.0,
            width,
            height,
        }
    }

    /// Center of the rectangle.
    #[inline]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Area in square pixels.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Length of the diagonal.
    #[inline]
    pub fn diagonal(&self) -> f64 {
        (self.width * self.width + self.height * self.height).sqrt()
    }

    /// Half-open containment test: left/top edges inclusive, right/bottom exclusive.
    #[inline]
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.x && p.x < self.x2() && p.y >= self.y && p.y < self.y2()
    }

    /// Clamp the rectangle so it lies inside `bounds`, preserving its size when possible.
    pub fn clamp_within(&self, bounds: &Rect) -> Rect {
        let width = self.width.min(bounds.width);
        let height = self.height.min(bounds.height);
        let x = self.x.max(bounds.x).min(bounds.x2() - width);
        let y = self.y.max(bounds.y).min(bounds.y2() - height);
        Rect::new(x, y, width, height)
    }
}

/// The part of the map a camera may legally be pointed at.
///
/// The region is the map bounds minus any exclusion rectangles (HUD overlays,
/// black borders around non-square maps and so on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlayableRegion {
    /// Outer bounds of the map
    pub bounds: Rect,
    /// Areas inside `bounds` that are never playable
    #[serde(default)]
    pub exclusions: Vec<Rect>,
}

impl PlayableRegion {
    /// Region covering the whole `width` x `height` map.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            bounds: Rect::new(0.0, 0.0, width as f64, height as f64),
            exclusions: Vec::new(),
        }
    }

    /// Add an exclusion rectangle.
    pub fn with_exclusion(mut self, rect: Rect) -> Self {
        self.exclusions.push(rect);
        self
    }

    /// Membership test used to validate every camera target.
    pub fn contains(&self, p: &Point) -> bool {
        p.is_finite()
            && self.bounds.contains(p)
            && !self.exclusions.iter().any(|r| r.contains(p))
    }

    /// Check the region is usable (positive size).
    pub fn is_valid(&self) -> bool {
        self.bounds.width > 0.0 && self.bounds.height > 0.0
    }

    /// Diagonal of the outer bounds.
    pub fn diagonal(&self) -> f64 {
        self.bounds.diagonal()
    }
}

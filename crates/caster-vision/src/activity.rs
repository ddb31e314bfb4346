//! Frame-differencing activity detection.
//!
//! Both frames are reduced to grayscale on a (optionally) downscaled grid,
//! differenced, thresholded, and split into 8-connected components. Each
//! component large enough becomes a short-lived `ActivityZone` in frame
//! coordinates.

use caster_models::{ActivityZone, Point};
use image::GrayImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::components::connected_regions;
use crate::frame::Frame;

/// Configuration for activity detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Analysis width in pixels; `None` analyses at full resolution (default: None)
    pub analysis_width: Option<u32>,
    /// Minimum intensity change to count as activity, 0-255 (default: 25)
    pub diff_threshold: u8,
    /// Minimum component area in analysis cells (default: 4)
    pub min_area: usize,
    /// Area in frame pixels that maps to importance 1.0 before capping (default: 60.0)
    pub reference_area: f64,
    /// Upper bound on activity importance (default: 0.8)
    pub importance_cap: f64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            analysis_width: None,
            diff_threshold: 25,
            min_area: 4,
            reference_area: 60.0,
            importance_cap: 0.8,
        }
    }
}

/// Stateless frame-diff detector.
#[derive(Debug, Clone, Default)]
pub struct ActivityDetector {
    config: ActivityConfig,
}

impl ActivityDetector {
    pub fn new(config: ActivityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    /// Activity zones between two frames, most important first.
    ///
    /// No previous frame or a size change yields no zones.
    pub fn detect(&self, prev: Option<&Frame>, curr: &Frame, now: f64) -> Vec<ActivityZone> {
        let Some(prev) = prev else {
            return Vec::new();
        };
        if !prev.same_size(curr) {
            warn!(
                "Activity detection skipped: frame size changed from {}x{} to {}x{}",
                prev.width(),
                prev.height(),
                curr.width(),
                curr.height()
            );
            return Vec::new();
        }
        if curr.is_malformed() {
            return Vec::new();
        }

        let before = prev.gray(self.config.analysis_width);
        let after = curr.gray(self.config.analysis_width);
        let mask = self.diff_mask(&before, &after);

        // Map analysis cells back to frame pixels.
        let scale_x = curr.width() as f64 / after.width() as f64;
        let scale_y = curr.height() as f64 / after.height() as f64;

        let mut zones: Vec<ActivityZone> = connected_regions(&mask, self.config.min_area)
            .into_iter()
            .map(|region| {
                let position = Point::new(
                    (region.centroid.x + 0.5) * scale_x - 0.5,
                    (region.centroid.y + 0.5) * scale_y - 0.5,
                );
                let area = region.area as f64 * scale_x * scale_y;
                let importance = (area / self.config.reference_area).min(self.config.importance_cap);
                ActivityZone::activity(position, area, importance, now)
            })
            .collect();

        zones.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        if !zones.is_empty() {
            debug!("Activity detection found {} zones", zones.len());
        }
        zones
    }

    fn diff_mask(&self, before: &GrayImage, after: &GrayImage) -> Array2<bool> {
        let (w, h) = (after.width() as usize, after.height() as usize);
        Array2::from_shape_fn((h, w), |(y, x)| {
            let a = before.get_pixel(x as u32, y as u32).0[0];
            let b = after.get_pixel(x as u32, y as u32).0[0];
            a.abs_diff(b) > self.config.diff_threshold
        })
    }
}

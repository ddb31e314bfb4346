//! Connected-region extraction and proximity clustering.

use std::collections::VecDeque;

use caster_models::{Point, Rect};
use ndarray::Array2;

const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// An 8-connected group of set cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Mean cell position
    pub centroid: Point,
    /// Number of cells
    pub area: usize,
    /// Tight bounding box (cell units)
    pub bbox: Rect,
}

/// Cells with value at or above `threshold`.
pub fn threshold(grid: &Array2<f32>, threshold: f32) -> Array2<bool> {
    grid.mapv(|v| v >= threshold)
}

/// Extract 8-connected regions with at least `min_area` cells.
///
/// Regions are returned largest first.
pub fn connected_regions(mask: &Array2<bool>, min_area: usize) -> Vec<Region> {
    let (h, w) = mask.dim();
    let mut visited = Array2::from_elem((h, w), false);
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for ((y, x), set) in mask.indexed_iter() {
        if !*set || visited[[y, x]] {
            continue;
        }

        visited[[y, x]] = true;
        queue.push_back((x, y));
        let (mut sx, mut sy, mut area) = (0.0f64, 0.0f64, 0usize);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);

        while let Some((cx, cy)) = queue.pop_front() {
            sx += cx as f64;
            sy += cy as f64;
            area += 1;
            min_x = min_x.min(cx);
            min_y = min_y.min(cy);
            max_x = max_x.max(cx);
            max_y = max_y.max(cy);

            for (dx, dy) in NEIGHBORS {
                let nx = cx as i64 + dx;
                let ny = cy as i64 + dy;
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if mask[[ny, nx]] && !visited[[ny, nx]] {
                    visited[[ny, nx]] = true;
                    queue.push_back((nx, ny));
                }
            }
        }

        if area >= min_area {
            regions.push(Region {
                centroid: Point::new(sx / area as f64, sy / area as f64),
                area,
                bbox: Rect::new(
                    min_x as f64,
                    min_y as f64,
                    (max_x - min_x + 1) as f64,
                    (max_y - min_y + 1) as f64,
                ),
            });
        }
    }

    regions.sort_by(|a, b| b.area.cmp(&a.area));
    regions
}

/// A proximity cluster of weighted points.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Weighted centroid
    pub centroid: Point,
    /// Number of member points
    pub members: usize,
    /// Sum of member weights
    pub weight: f64,
}

/// Greedy proximity grouping.
///
/// Points are visited strongest first; each joins the first cluster whose
/// running centroid lies within `radius`, otherwise it seeds a new cluster.
pub fn cluster_points(points: &[(Point, f64)], radius: f64) -> Vec<Cluster> {
    let mut ordered: Vec<&(Point, f64)> = points.iter().collect();
    ordered.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    // (weighted x sum, weighted y sum, weight, members)
    let mut acc: Vec<(f64, f64, f64, usize)> = Vec::new();
    for (p, weight) in ordered {
        let weight = weight.max(f64::EPSILON);
        let joined = acc.iter_mut().find(|(sx, sy, sw, _)| {
            let centroid = Point::new(sx / sw, sy / sw);
            centroid.is_near(p, radius)
        });
        match joined {
            Some((sx, sy, sw, n)) => {
                *sx += p.x * weight;
                *sy += p.y * weight;
                *sw += weight;
                *n += 1;
            }
            None => acc.push((p.x * weight, p.y * weight, weight, 1)),
        }
    }

    acc.into_iter()
        .map(|(sx, sy, sw, n)| Cluster {
            centroid: Point::new(sx / sw, sy / sw),
            members: n,
            weight: sw,
        })
        .collect()
}

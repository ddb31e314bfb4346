//! Density-field helpers.
//!
//! Fields are `(height, width)` grids of `f32` in `[0, 1]`, indexed `[[y, x]]`.

use caster_models::Point;
use ndarray::Array2;

/// Box blur with a `(2r + 1)`-square window.
///
/// Each output cell is the mean of the window clipped to the grid, so cells
/// near the border are not darkened by the missing neighbourhood. Runs in
/// O(width * height) via a summed-area table.
pub fn box_blur(grid: &Array2<f32>, radius: usize) -> Array2<f32> {
    let (h, w) = grid.dim();
    if radius == 0 || h == 0 || w == 0 {
        return grid.clone();
    }

    // Summed-area table with a zero row/column in front.
    let mut sat = Array2::<f64>::zeros((h + 1, w + 1));
    for y in 0..h {
        let mut row = 0.0f64;
        for x in 0..w {
            row += grid[[y, x]] as f64;
            sat[[y + 1, x + 1]] = sat[[y, x + 1]] + row;
        }
    }

    Array2::from_shape_fn((h, w), |(y, x)| {
        let y0 = y.saturating_sub(radius);
        let x0 = x.saturating_sub(radius);
        let y1 = (y + radius + 1).min(h);
        let x1 = (x + radius + 1).min(w);
        let sum = sat[[y1, x1]] - sat[[y0, x1]] - sat[[y1, x0]] + sat[[y0, x0]];
        let n = ((y1 - y0) * (x1 - x0)) as f64;
        (sum / n) as f32
    })
}

/// Exponential moving average in place: `field = alpha * next + (1 - alpha) * field`.
pub fn blend(field: &mut Array2<f32>, next: &Array2<f32>, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    field.zip_mut_with(next, |old, new| {
        *old = alpha * *new + (1.0 - alpha) * *old;
    });
}

/// Largest value and its `(x, y)` cell. `None` for an empty grid.
pub fn argmax(grid: &Array2<f32>) -> Option<(usize, usize, f32)> {
    let mut best: Option<(usize, usize, f32)> = None;
    for ((y, x), v) in grid.indexed_iter() {
        match best {
            Some((_, _, b)) if *v <= b => {}
            _ => best = Some((x, y, *v)),
        }
    }
    best
}

/// Peak of the field, taken as the centroid of the plateau around the maximum.
///
/// Cells within `radius` of the first maximum whose value is within
/// `tolerance` of it are averaged, so a flat-topped blob reports its middle
/// rather than its top-left corner.
pub fn peak_centroid(grid: &Array2<f32>, radius: usize, tolerance: f32) -> Option<(Point, f32)> {
    let (mx, my, max) = argmax(grid)?;
    let (h, w) = grid.dim();
    let (mut sx, mut sy, mut n) = (0.0f64, 0.0f64, 0usize);
    for y in my.saturating_sub(radius)..(my + radius + 1).min(h) {
        for x in mx.saturating_sub(radius)..(mx + radius + 1).min(w) {
            if grid[[y, x]] >= max - tolerance {
                sx += x as f64;
                sy += y as f64;
                n += 1;
            }
        }
    }
    Some((Point::new(sx / n as f64, sy / n as f64), max))
}

/// Value at the cell containing `p`; zero outside the grid.
pub fn value_at(grid: &Array2<f32>, p: Point) -> f32 {
    if !p.is_finite() || p.x < 0.0 || p.y < 0.0 {
        return 0.0;
    }
    let (x, y) = (p.x.round() as usize, p.y.round() as usize);
    grid.get((y, x)).copied().unwrap_or(0.0)
}

/// Statistics of a field sampled inside a disc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscStats {
    /// Cells whose value exceeds the floor (unit-count proxy)
    pub cells_above_floor: usize,
    /// Highest value inside the disc
    pub peak: f32,
    /// Where the peak was found
    pub peak_at: Point,
    /// Mean over the cells above the floor
    pub mean_above_floor: f32,
}

/// Sample `grid` inside the disc of `radius` around `center`.
pub fn sample_disc(grid: &Array2<f32>, center: Point, radius: f64, floor: f32) -> DiscStats {
    let (h, w) = grid.dim();
    let mut stats = DiscStats {
        cells_above_floor: 0,
        peak: 0.0,
        peak_at: center,
        mean_above_floor: 0.0,
    };
    if h == 0 || w == 0 || !center.is_finite() || radius <= 0.0 {
        return stats;
    }

    let x0 = (center.x - radius).floor().max(0.0) as usize;
    let y0 = (center.y - radius).floor().max(0.0) as usize;
    let x1 = ((center.x + radius).ceil().max(0.0) as usize).min(w - 1);
    let y1 = ((center.y + radius).ceil().max(0.0) as usize).min(h - 1);
    let r2 = radius * radius;
    let mut sum = 0.0f64;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f64 - center.x;
            let dy = y as f64 - center.y;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let v = grid[[y, x]];
            if v > stats.peak {
                stats.peak = v;
                stats.peak_at = Point::new(x as f64, y as f64);
            }
            if v > floor {
                stats.cells_above_floor += 1;
                sum += v as f64;
            }
        }
    }

    if stats.cells_above_floor > 0 {
        stats.mean_above_floor = (sum / stats.cells_above_floor as f64) as f32;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(w: usize, h: usize, x0: usize, y0: usize, size: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(y, x)| {
            if x >= x0 && x < x0 + size && y >= y0 && y < y0 + size {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_box_blur_preserves_flat_interior() {
        let grid = block(30, 30, 5, 5, 12);
        let blurred = box_blur(&grid, 2);
        assert!((blurred[[10, 10]] - 1.0).abs() < 1e-6);
        assert!(blurred[[5, 5]] < 1.0);
        assert!(blurred[[0, 0]].abs() < 1e-6);
    }

    #[test]
    fn test_box_blur_border_is_not_darkened() {
        let grid = Array2::from_elem((8, 8), 1.0f32);
        let blurred = box_blur(&grid, 3);
        assert!(blurred.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_blend() {
        let mut field = Array2::from_elem((2, 2), 0.0f32);
        let next = Array2::from_elem((2, 2), 1.0f32);
        blend(&mut field, &next, 0.25);
        assert!((field[[0, 0]] - 0.25).abs() < 1e-6);
        blend(&mut field, &next, 0.25);
        assert!((field[[1, 1]] - 0.4375).abs() < 1e-6);
    }

    #[test]
    fn test_peak_centroid_of_plateau() {
        let grid = block(40, 40, 12, 12, 16);
        let (p, v) = peak_centroid(&grid, 8, 1e-4).unwrap();
        assert!((v - 1.0).abs() < 1e-6);
        assert!((p.x - 16.0).abs() < 1e-9, "{p:?}");
        assert!((p.y - 16.0).abs() < 1e-9, "{p:?}");
    }

    #[test]
    fn test_sample_disc() {
        let grid = block(60, 60, 35, 15, 10);
        let stats = sample_disc(&grid, Point::new(20.0, 20.0), 30.0, 0.1);
        assert_eq!(stats.cells_above_floor, 100);
        assert!((stats.peak - 1.0).abs() < 1e-6);
        assert!((stats.mean_above_floor - 1.0).abs() < 1e-6);
        assert!(stats.peak_at.x >= 35.0);

        let far = sample_disc(&grid, Point::new(5.0, 55.0), 10.0, 0.1);
        assert_eq!(far.cells_above_floor, 0);
        assert_eq!(far.peak, 0.0);
    }

    #[test]
    fn test_value_at_outside_is_zero() {
        let grid = Array2::from_elem((4, 4), 0.5f32);
        assert_eq!(value_at(&grid, Point::new(1.0, 1.0)), 0.5);
        assert_eq!(value_at(&grid, Point::new(10.0, 1.0)), 0.0);
        assert_eq!(value_at(&grid, Point::new(-1.0, 1.0)), 0.0);
    }
}

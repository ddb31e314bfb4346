//! Owned RGB snapshots of the tracked map region.

use std::path::Path;
use std::time::Instant;

use caster_models::Rect;
use image::{imageops, GrayImage, Rgb, RgbImage};

use crate::error::{VisionError, VisionResult};

/// A single captured frame.
///
/// Frames are immutable once captured and are shared between the capture
/// worker and the tick loop behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    /// Capture sequence number
    seq: u64,
    /// When the frame was captured
    captured_at: Instant,
}

impl Frame {
    /// Wrap an RGB image.
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            seq: 0,
            captured_at: Instant::now(),
        }
    }

    /// Build a frame from packed RGB bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> VisionResult<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(VisionError::malformed(format!(
                "expected {} bytes for {}x{} RGB, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        RgbImage::from_raw(width, height, data)
            .map(Self::new)
            .ok_or_else(|| VisionError::malformed("buffer rejected by image decoder"))
    }

    /// Decode a frame from an image file.
    pub fn open(path: impl AsRef<Path>) -> VisionResult<Self> {
        let image = image::open(path.as_ref())?.to_rgb8();
        Ok(Self::new(image))
    }

    /// Uniformly filled frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    /// Set the capture sequence number.
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Frame bounds as a rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width() as f64, self.height() as f64)
    }

    /// Underlying image.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Pixel at `(x, y)`; caller guarantees bounds.
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    /// A frame with no pixels carries no signal.
    pub fn is_malformed(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Same dimensions as `other`.
    pub fn same_size(&self, other: &Frame) -> bool {
        self.width() == other.width() && self.height() == other.height()
    }

    /// Grayscale copy, optionally downscaled to `max_width` (nearest neighbour).
    pub fn gray(&self, max_width: Option<u32>) -> GrayImage {
        let gray = imageops::grayscale(&self.image);
        match max_width {
            Some(w) if w > 0 && w < self.width() => {
                let scale = w as f64 / self.width() as f64;
                let h = ((self.height() as f64 * scale).round() as u32).max(1);
                imageops::resize(&gray, w, h, imageops::FilterType::Nearest)
            }
            _ => gray,
        }
    }

    /// Paint a solid rectangle; clipped to the frame. Handy for synthetic frames.
    pub fn paint(&mut self, x: u32, y: u32, width: u32, height: u32, rgb: [u8; 3]) {
        let x2 = (x + width).min(self.width());
        let y2 = (y + height).min(self.height());
        for py in y.min(y2)..y2 {
            for px in x.min(x2)..x2 {
                self.image.put_pixel(px, py, Rgb(rgb));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_rejects_short_buffer() {
        let err = Frame::from_raw(4, 4, vec![0; 10]).unwrap_err();
        assert!(err.is_classification_failure());
    }

    #[test]
    fn test_zero_sized_frame_is_malformed() {
        let frame = Frame::from_raw(0, 0, Vec::new()).unwrap();
        assert!(frame.is_malformed());
        assert!(!Frame::filled(2, 2, [0, 0, 0]).is_malformed());
    }

    #[test]
    fn test_paint_clips_to_bounds() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0]);
        frame.paint(8, 8, 5, 5, [255, 0, 0]);
        assert_eq!(frame.rgb(9, 9), [255, 0, 0]);
        assert_eq!(frame.rgb(7, 7), [0, 0, 0]);
    }

    #[test]
    fn test_gray_downscale_keeps_aspect() {
        let frame = Frame::filled(200, 100, [10, 10, 10]);
        let small = frame.gray(Some(50));
        assert_eq!(small.width(), 50);
        assert_eq!(small.height(), 25);
        assert_eq!(frame.gray(None).width(), 200);
    }

    #[test]
    fn test_open_roundtrip_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut frame = Frame::filled(8, 6, [0, 0, 0]);
        frame.paint(1, 1, 2, 2, [0, 66, 255]);
        frame.image().save(&path).unwrap();

        let loaded = Frame::open(&path).unwrap();
        assert_eq!(loaded.width(), 8);
        assert_eq!(loaded.rgb(1, 1), [0, 66, 255]);
    }
}

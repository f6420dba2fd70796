//! Frames.
//!
//! A [`Frame`] is one decoded image as read from a capture source: an RGB8
//! pixel buffer plus capture timestamp and source identifier. Frames are
//! treated as immutable once read; annotation happens on a working copy so
//! the original evidence pixels survive untouched.
//!
//! Cropping for evidence goes through [`Frame::crop`], which clamps the
//! requested region to the frame and reports degenerate (zero-area) regions
//! as `None` rather than erroring.

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::BBox;

const CHANNELS: usize = 3;

/// One RGB8 video frame.
#[derive(Clone)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Identifier of the producing source (URL, path, or stub name).
    pub source_id: String,
}

impl std::fmt::Debug for Frame {
    // The pixel buffer has no business in log output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("source_id", &self.source_id)
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// Wrap a raw RGB8 buffer. The buffer length must be `width * height * 3`.
    pub fn new(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_ms: u64,
        source_id: impl Into<String>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer size mismatch: got {} bytes, expected {} for {}x{}",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            timestamp_ms,
            source_id: source_id.into(),
        })
    }

    /// A solid-color frame. Handy for tests and synthetic sources.
    pub fn filled(
        width: u32,
        height: u32,
        rgb: [u8; 3],
        timestamp_ms: u64,
        source_id: impl Into<String>,
    ) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&rgb);
        }
        Self {
            pixels,
            width,
            height,
            timestamp_ms,
            source_id: source_id.into(),
        }
    }

    /// Convert a decoded image into a frame.
    pub fn from_rgb_image(
        image: RgbImage,
        timestamp_ms: u64,
        source_id: impl Into<String>,
    ) -> Self {
        let width = image.width();
        let height = image.height();
        Self {
            pixels: image.into_raw(),
            width,
            height,
            timestamp_ms,
            source_id: source_id.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable copy for annotation. The source frame stays pristine.
    pub fn working_copy(&self) -> Frame {
        self.clone()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// Write one pixel. Out-of-bounds coordinates are ignored so drawing
    /// code can clamp boxes without per-pixel bounds juggling.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        self.pixels[idx..idx + CHANNELS].copy_from_slice(&rgb);
    }

    /// Crop a region for evidence persistence.
    ///
    /// The region is clamped to the frame first; `None` means the clamped
    /// region has zero area (the box was degenerate or entirely outside).
    pub fn crop(&self, bbox: BBox) -> Option<RgbImage> {
        let clamped = bbox.clamp_to(self.width, self.height);
        if !clamped.is_valid() {
            return None;
        }
        let (w, h) = (clamped.width(), clamped.height());
        let mut out = RgbImage::new(w, h);
        for row in 0..h {
            for col in 0..w {
                let src = self.pixel(clamped.x1 as u32 + col, clamped.y1 as u32 + row);
                out.put_pixel(col, row, image::Rgb(src));
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 4, 4, 0, "test").is_err());
        assert!(Frame::new(vec![0u8; 48], 4, 4, 0, "test").is_ok());
    }

    #[test]
    fn crop_clamps_to_frame() {
        let frame = Frame::filled(8, 8, [10, 20, 30], 0, "test");
        let crop = frame.crop(BBox::new(4, 4, 100, 100)).expect("crop");
        assert_eq!(crop.width(), 4);
        assert_eq!(crop.height(), 4);
        assert_eq!(crop.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn degenerate_crop_is_none() {
        let frame = Frame::filled(8, 8, [0, 0, 0], 0, "test");
        assert!(frame.crop(BBox::new(20, 20, 30, 30)).is_none());
        assert!(frame.crop(BBox::new(5, 5, 5, 9)).is_none());
    }

    #[test]
    fn working_copy_leaves_original_untouched() {
        let frame = Frame::filled(4, 4, [1, 1, 1], 0, "test");
        let mut copy = frame.working_copy();
        copy.set_pixel(2, 2, [200, 0, 0]);
        assert_eq!(frame.pixel(2, 2), [1, 1, 1]);
        assert_eq!(copy.pixel(2, 2), [200, 0, 0]);
    }

    #[test]
    fn set_pixel_ignores_out_of_bounds() {
        let mut frame = Frame::filled(4, 4, [0, 0, 0], 0, "test");
        frame.set_pixel(100, 100, [255, 255, 255]);
        assert_eq!(frame.pixel(3, 3), [0, 0, 0]);
    }
}

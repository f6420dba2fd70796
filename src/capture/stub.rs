//! Synthetic capture source.
//!
//! Generates deterministic scene frames with a little sensor-style noise on
//! top. Used by tests and for pipeline bring-up before a real camera backend
//! is wired in.

use anyhow::Result;
use rand::Rng;

use super::{CaptureConfig, CaptureSource, CaptureStats};
use crate::frame::Frame;
use crate::now_epoch_ms;

/// Synthetic frame source for `stub://` URLs.
pub struct StubSource {
    config: CaptureConfig,
    frame_count: u64,
    scene_state: u8,
    connected: bool,
}

impl StubSource {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            connected: false,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize * 3;
        // The scene "changes" every 50 frames so downstream consumers see
        // something other than a static image.
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        // Light noise, like a real sensor.
        let mut rng = rand::thread_rng();
        for _ in 0..(pixel_count / 512) {
            let idx = rng.gen_range(0..pixel_count);
            pixels[idx] = pixels[idx].wrapping_add(rng.gen_range(0..8));
        }
        pixels
    }
}

impl CaptureSource for StubSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("capture: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            now_epoch_ms()?,
            self.config.url.clone(),
        )
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

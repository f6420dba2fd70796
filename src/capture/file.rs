//! Still-image directory source.
//!
//! Plays a directory of JPEG/PNG files in lexicographic order as a frame
//! stream. Useful for replaying exported footage or fixture scenes through
//! the full pipeline without a camera. Loops by default so a short fixture
//! set behaves like a live stream.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use super::{CaptureSource, CaptureStats};
use crate::frame::Frame;
use crate::now_epoch_ms;

const STILL_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Frame source backed by a directory of still images.
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    loop_playback: bool,
    frames_captured: u64,
}

impl ImageDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            cursor: 0,
            loop_playback: true,
            frames_captured: 0,
        }
    }

    /// Stop at the end of the directory instead of looping.
    pub fn play_once(mut self) -> Self {
        self.loop_playback = false;
        self
    }
}

impl CaptureSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to open frame directory {}", self.dir.display()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| STILL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(anyhow!(
                "frame directory {} contains no jpg/png stills",
                self.dir.display()
            ));
        }
        log::info!(
            "capture: {} stills queued from {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.cursor >= self.files.len() {
            if !self.loop_playback {
                return Err(anyhow!("end of frame directory {}", self.dir.display()));
            }
            self.cursor = 0;
        }
        let path = &self.files[self.cursor];
        self.cursor += 1;
        let image = image::open(path)
            .with_context(|| format!("failed to decode still {}", path.display()))?
            .to_rgb8();
        self.frames_captured += 1;
        Ok(Frame::from_rgb_image(
            image,
            now_epoch_ms()?,
            self.dir.display().to_string(),
        ))
    }

    fn is_healthy(&self) -> bool {
        !self.files.is_empty()
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frames_captured,
            source: self.dir.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn write_still(dir: &std::path::Path, name: &str, rgb: [u8; 3]) {
        let mut img = RgbImage::new(4, 4);
        for px in img.pixels_mut() {
            px.0 = rgb;
        }
        img.save(dir.join(name)).expect("write still");
    }

    #[test]
    fn plays_stills_in_order_and_loops() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_still(dir.path(), "b.png", [0, 0, 2]);
        write_still(dir.path(), "a.png", [0, 0, 1]);

        let mut source = ImageDirSource::new(dir.path());
        source.connect().expect("connect");

        let first = source.next_frame().expect("frame");
        assert_eq!(first.pixel(0, 0), [0, 0, 1]);
        let second = source.next_frame().expect("frame");
        assert_eq!(second.pixel(0, 0), [0, 0, 2]);
        // Loops back to the first still.
        let third = source.next_frame().expect("frame");
        assert_eq!(third.pixel(0, 0), [0, 0, 1]);
        assert_eq!(source.stats().frames_captured, 3);
    }

    #[test]
    fn play_once_errors_at_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_still(dir.path(), "only.png", [5, 5, 5]);

        let mut source = ImageDirSource::new(dir.path()).play_once();
        source.connect().expect("connect");
        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn empty_directory_fails_connect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut source = ImageDirSource::new(dir.path());
        assert!(source.connect().is_err());
    }
}

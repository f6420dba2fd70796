//! Frame capture sources.
//!
//! A capture source owns one video input and hands out decoded [`Frame`]s:
//! - `stub://<name>`: deterministic synthetic frames for tests and bring-up
//! - a local directory of JPEG/PNG stills, played in lexicographic order
//!
//! Network capture (RTSP cameras, V4L2 devices) plugs in behind the same
//! [`CaptureSource`] trait and is not built into this crate.
//!
//! Sources distinguish two failure classes: `connect` errors are fatal
//! (the stream worker refuses to start), while `next_frame` errors are
//! transient (the worker logs, sleeps, and retries).

mod file;
mod stub;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use file::ImageDirSource;
pub use stub::StubSource;

/// Configuration for opening a capture source.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// `stub://<name>` or a local directory path.
    pub url: String,
    /// Target frame rate. Sources may decimate to this rate.
    pub target_fps: u32,
    /// Frame width for synthetic sources.
    pub width: u32,
    /// Frame height for synthetic sources.
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// One video input.
pub trait CaptureSource: Send {
    /// Open the underlying device/stream. Failure here is fatal to startup.
    fn connect(&mut self) -> Result<()>;

    /// Read the next frame, blocking up to the backend's own timeout.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> CaptureStats;
}

/// Capture statistics for health logging.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Open the source a config points at.
///
/// Only `stub://` URLs and local paths are supported; other URL schemes name
/// backends that are not built into this crate.
pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn CaptureSource + Send>> {
    let url = config.url.trim();
    if url.is_empty() {
        return Err(anyhow!("capture source url is empty"));
    }
    if url.starts_with("stub://") {
        return Ok(Box::new(StubSource::new(config.clone())));
    }
    if url.contains("://") {
        return Err(anyhow!(
            "capture source '{}' requires a streaming backend that is not built in",
            url
        ));
    }
    Ok(Box::new(ImageDirSource::new(url)))
}

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analyzer::DEFAULT_HISTORY_CAPACITY;
use crate::capture::CaptureConfig;
use crate::detect::DetectorConfig;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_OUTPUT_DIR: &str = "data/violations";
const DEFAULT_MIN_CONFIDENCE: f32 = 0.25;
const DEFAULT_RIDER_RADIUS_PX: i32 = 100;
const DEFAULT_DENSITY_WINDOW_SECS: u64 = 5 * 60;
const DEFAULT_FORECAST_LOOKAHEAD_SECS: u64 = 5 * 60;

#[derive(Debug, Deserialize, Default)]
struct RoadwatchConfigFile {
    source: Option<SourceConfigFile>,
    evidence: Option<EvidenceConfigFile>,
    detection: Option<DetectionConfigFile>,
    analyzer: Option<AnalyzerConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct EvidenceConfigFile {
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    min_confidence: Option<f32>,
    rider_radius_px: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct AnalyzerConfigFile {
    history_capacity: Option<usize>,
    density_window_secs: Option<u64>,
    forecast_lookahead_secs: Option<u64>,
}

/// Validated pipeline configuration: optional TOML file layered with
/// environment overrides.
#[derive(Debug, Clone)]
pub struct RoadwatchConfig {
    pub source: CaptureConfig,
    pub output_dir: PathBuf,
    pub detection: DetectorConfig,
    pub analyzer: AnalyzerSettings,
}

#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub history_capacity: usize,
    pub density_window: Duration,
    pub forecast_lookahead: Duration,
}

impl RoadwatchConfig {
    /// Load from the file named by `ROADWATCH_CONFIG` (when set), then
    /// apply environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROADWATCH_CONFIG").ok().map(PathBuf::from);
        Self::load_with(config_path.as_deref())
    }

    /// Same as [`RoadwatchConfig::load`] with an explicit file path taking
    /// precedence over the environment.
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("ROADWATCH_CONFIG").ok().map(PathBuf::from);
        let file_cfg = match path.or(env_path.as_deref()) {
            Some(path) => read_config_file(path)?,
            None => RoadwatchConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RoadwatchConfigFile) -> Self {
        let source = CaptureConfig {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_FRAME_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_FRAME_HEIGHT),
        };
        let output_dir = file
            .evidence
            .and_then(|evidence| evidence.output_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let detection = DetectorConfig {
            min_confidence: file
                .detection
                .as_ref()
                .and_then(|detection| detection.min_confidence)
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            rider_radius_px: file
                .detection
                .as_ref()
                .and_then(|detection| detection.rider_radius_px)
                .unwrap_or(DEFAULT_RIDER_RADIUS_PX),
        };
        let analyzer = AnalyzerSettings {
            history_capacity: file
                .analyzer
                .as_ref()
                .and_then(|analyzer| analyzer.history_capacity)
                .unwrap_or(DEFAULT_HISTORY_CAPACITY),
            density_window: Duration::from_secs(
                file.analyzer
                    .as_ref()
                    .and_then(|analyzer| analyzer.density_window_secs)
                    .unwrap_or(DEFAULT_DENSITY_WINDOW_SECS),
            ),
            forecast_lookahead: Duration::from_secs(
                file.analyzer
                    .and_then(|analyzer| analyzer.forecast_lookahead_secs)
                    .unwrap_or(DEFAULT_FORECAST_LOOKAHEAD_SECS),
            ),
        };
        Self {
            source,
            output_dir,
            detection,
            analyzer,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ROADWATCH_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(dir) = std::env::var("ROADWATCH_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(fps) = std::env::var("ROADWATCH_TARGET_FPS") {
            let fps: u32 = fps
                .parse()
                .map_err(|_| anyhow!("ROADWATCH_TARGET_FPS must be an integer"))?;
            self.source.target_fps = fps;
        }
        if let Ok(conf) = std::env::var("ROADWATCH_MIN_CONFIDENCE") {
            let conf: f32 = conf
                .parse()
                .map_err(|_| anyhow!("ROADWATCH_MIN_CONFIDENCE must be a number in [0, 1]"))?;
            self.detection.min_confidence = conf;
        }
        if let Ok(radius) = std::env::var("ROADWATCH_RIDER_RADIUS_PX") {
            let radius: i32 = radius
                .parse()
                .map_err(|_| anyhow!("ROADWATCH_RIDER_RADIUS_PX must be an integer"))?;
            self.detection.rider_radius_px = radius;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("frame dimensions must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            return Err(anyhow!("min_confidence must lie in [0, 1]"));
        }
        if self.detection.rider_radius_px <= 0 {
            return Err(anyhow!("rider_radius_px must be greater than zero"));
        }
        if self.analyzer.history_capacity == 0 {
            return Err(anyhow!("history_capacity must be greater than zero"));
        }
        if self.analyzer.density_window.is_zero() || self.analyzer.forecast_lookahead.is_zero() {
            return Err(anyhow!("analyzer windows must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<RoadwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = toml::from_str(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    Ok(cfg)
}

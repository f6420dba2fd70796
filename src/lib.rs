//! Roadwatch core.
//!
//! This crate implements the frame-processing pipeline of a traffic-violation
//! monitoring system: a cancellable capture loop feeding a per-frame
//! detection-and-correlation pass, evidence persistence for detected
//! violations, a typed event fan-out, and a bounded-history traffic analyzer.
//!
//! # Architecture
//!
//! Control flow, leaf-first:
//!
//! 1. A [`capture::CaptureSource`] produces [`frame::Frame`]s.
//! 2. [`worker::StreamWorker`] runs the capture loop on a background thread
//!    and routes every frame through one [`processor::FrameProcessor`].
//! 3. The processor asks the [`detect::Detector`] for vehicles and
//!    violations, updates the [`analyzer::TrafficAnalyzer`], and hands
//!    violations to the [`record::ViolationRecorder`].
//! 4. The recorder persists evidence (JPEG crop + JSON sidecar) and emits a
//!    `Violation` event on the [`events::EventBus`], which fans out to
//!    subscribers in isolation.
//!
//! The object-detection model and the helmet/seatbelt/plate classifiers are
//! external collaborators injected through the capability traits in
//! [`detect`]. The HTTP/WebSocket layer, query stores, and databases are
//! outside this crate; they subscribe to the event bus and poll
//! [`worker::StreamWorker::status`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod analyzer;
pub mod annotate;
pub mod capture;
pub mod config;
pub mod detect;
pub mod events;
pub mod frame;
pub mod processor;
pub mod record;
pub mod worker;

pub use analyzer::{TrafficAnalyzer, TrafficSample};
pub use capture::{open_source, CaptureConfig, CaptureSource, CaptureStats};
pub use config::RoadwatchConfig;
pub use detect::{
    Detection, Detector, DetectorConfig, HelmetClassifier, ObjectModel, PlateReader, RawDetection,
    SeatbeltClassifier,
};
pub use events::{EventBus, EventKind, EventPayload, FrameSummary};
pub use frame::Frame;
pub use processor::{FrameProcessor, FrameReport};
pub use record::ViolationRecorder;
pub use worker::{ProcessorStatus, StreamWorker};

// -------------------- Time helpers --------------------

/// Milliseconds since the Unix epoch.
pub fn now_epoch_ms() -> Result<u64> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(now.as_millis() as u64)
}

/// Seconds since the Unix epoch.
pub fn now_epoch_s() -> Result<u64> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(now.as_secs())
}

// -------------------- Bounding boxes --------------------

/// Axis-aligned bounding box in integer pixel coordinates.
///
/// A box is well-formed when `x1 < x2` and `y1 < y2`. Boxes straight out of
/// a model may exceed frame bounds; [`BBox::clamp_to`] brings them back in
/// before cropping or drawing. Serialized as the 4-tuple `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32, i32, i32)", into = "(i32, i32, i32, i32)")]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Integer box center, matching the truncating division the detection
    /// rules use for rider association.
    pub fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    /// Clamp the box to a `width` x `height` frame. The result may be
    /// degenerate (zero area) when the box lies entirely outside.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        Self {
            x1: self.x1.clamp(0, width as i32),
            y1: self.y1.clamp(0, height as i32),
            x2: self.x2.clamp(0, width as i32),
            y2: self.y2.clamp(0, height as i32),
        }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }
}

impl From<(i32, i32, i32, i32)> for BBox {
    fn from((x1, y1, x2, y2): (i32, i32, i32, i32)) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BBox> for (i32, i32, i32, i32) {
    fn from(b: BBox) -> Self {
        (b.x1, b.y1, b.x2, b.y2)
    }
}

// -------------------- Violations --------------------

/// The violation kinds the pipeline reports.
///
/// `WrongWay` is reserved: recognizing it needs direction tracking across
/// frames, which this core does not implement. Every [`ViolationSet`] still
/// carries the key so subscribers can rely on its presence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoHelmet,
    NoSeatbelt,
    TripleRiding,
    WrongWay,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 4] = [
        ViolationKind::NoHelmet,
        ViolationKind::NoSeatbelt,
        ViolationKind::TripleRiding,
        ViolationKind::WrongWay,
    ];

    /// Stable lowercase identifier used in record ids and file names.
    pub fn slug(&self) -> &'static str {
        match self {
            ViolationKind::NoHelmet => "no_helmet",
            ViolationKind::NoSeatbelt => "no_seatbelt",
            ViolationKind::TripleRiding => "triple_riding",
            ViolationKind::WrongWay => "wrong_way",
        }
    }
}

/// One detected violation instance, before persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Region the violation was observed in. For rider violations this is
    /// the rider's box; for vehicle violations the vehicle's.
    pub bbox: BBox,
    pub confidence: f32,
    /// The associated vehicle, when the violation region is not the vehicle
    /// itself (e.g. a rider without a helmet).
    pub vehicle_bbox: Option<BBox>,
    /// Rider count for occupancy violations.
    pub rider_count: Option<u32>,
}

/// Per-frame violation lists, keyed by kind. All four kinds are always
/// present, each possibly empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ViolationSet {
    pub no_helmet: Vec<Violation>,
    pub no_seatbelt: Vec<Violation>,
    pub triple_riding: Vec<Violation>,
    pub wrong_way: Vec<Violation>,
}

impl ViolationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.list_mut(violation.kind).push(violation);
    }

    pub fn list(&self, kind: ViolationKind) -> &[Violation] {
        match kind {
            ViolationKind::NoHelmet => &self.no_helmet,
            ViolationKind::NoSeatbelt => &self.no_seatbelt,
            ViolationKind::TripleRiding => &self.triple_riding,
            ViolationKind::WrongWay => &self.wrong_way,
        }
    }

    fn list_mut(&mut self, kind: ViolationKind) -> &mut Vec<Violation> {
        match kind {
            ViolationKind::NoHelmet => &mut self.no_helmet,
            ViolationKind::NoSeatbelt => &mut self.no_seatbelt,
            ViolationKind::TripleRiding => &mut self.triple_riding,
            ViolationKind::WrongWay => &mut self.wrong_way,
        }
    }

    /// Iterate every violation in kind order.
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        ViolationKind::ALL.iter().flat_map(|kind| self.list(*kind))
    }

    pub fn total(&self) -> usize {
        ViolationKind::ALL
            .iter()
            .map(|kind| self.list(*kind).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn counts(&self) -> ViolationCounts {
        ViolationCounts {
            no_helmet: self.no_helmet.len(),
            no_seatbelt: self.no_seatbelt.len(),
            triple_riding: self.triple_riding.len(),
            wrong_way: self.wrong_way.len(),
        }
    }
}

/// Per-kind violation tallies for status snapshots and event payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationCounts {
    pub no_helmet: usize,
    pub no_seatbelt: usize,
    pub triple_riding: usize,
    pub wrong_way: usize,
}

// -------------------- License plates --------------------

/// Best-effort plate recognition result. Absence is common and not an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LicensePlateInfo {
    pub number: String,
    pub confidence: f32,
    pub bbox: BBox,
}

// -------------------- Evidence records --------------------

/// Persisted evidence for one violation instance. Written as a JSON sidecar
/// next to the cropped evidence image that shares its id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// `<epoch-seconds>-<kind-slug>-<sequence>`. The sequence is a
    /// process-wide monotonic counter, so ids stay unique across frames and
    /// batches that share the same second.
    pub id: String,
    pub kind: ViolationKind,
    pub timestamp_ms: u64,
    pub image_path: PathBuf,
    /// Hex SHA-256 digest of the persisted JPEG.
    pub image_sha256: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub vehicle_bbox: Option<BBox>,
    pub rider_count: Option<u32>,
    pub plate: Option<LicensePlateInfo>,
    pub source_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_clamps_into_frame_bounds() {
        let bbox = BBox::new(-10, 5, 700, 500);
        let clamped = bbox.clamp_to(640, 480);
        assert_eq!(clamped, BBox::new(0, 5, 640, 480));
        assert!(clamped.is_valid());
    }

    #[test]
    fn bbox_fully_outside_clamps_to_zero_area() {
        let bbox = BBox::new(700, 500, 900, 600);
        let clamped = bbox.clamp_to(640, 480);
        assert_eq!(clamped.area(), 0);
        assert!(!clamped.is_valid());
    }

    #[test]
    fn bbox_serializes_as_tuple() {
        let bbox = BBox::new(1, 2, 3, 4);
        let json = serde_json::to_string(&bbox).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let back: BBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bbox);
    }

    #[test]
    fn violation_set_always_carries_all_kinds() {
        let set = ViolationSet::new();
        for kind in ViolationKind::ALL {
            assert!(set.list(kind).is_empty());
        }
        assert!(set.is_empty());
    }

    #[test]
    fn violation_set_routes_by_kind() {
        let mut set = ViolationSet::new();
        set.push(Violation {
            kind: ViolationKind::TripleRiding,
            bbox: BBox::new(0, 0, 10, 10),
            confidence: 0.9,
            vehicle_bbox: None,
            rider_count: Some(3),
        });
        assert_eq!(set.list(ViolationKind::TripleRiding).len(), 1);
        assert_eq!(set.total(), 1);
        assert_eq!(set.counts().triple_riding, 1);
        assert_eq!(set.counts().no_helmet, 0);
    }
}

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::BBox;

/// COCO class ids the pipeline cares about.
pub const PERSON_CLASS: u32 = 0;
pub const CAR_CLASS: u32 = 2;
pub const MOTORCYCLE_CLASS: u32 = 3;
pub const BUS_CLASS: u32 = 5;
pub const TRUCK_CLASS: u32 = 7;

/// The vehicle class set: car, motorcycle, bus, truck.
pub const VEHICLE_CLASSES: [u32; 4] = [CAR_CLASS, MOTORCYCLE_CLASS, BUS_CLASS, TRUCK_CLASS];

pub fn is_vehicle_class(class_id: u32) -> bool {
    VEHICLE_CLASSES.contains(&class_id)
}

pub fn class_name(class_id: u32) -> &'static str {
    match class_id {
        PERSON_CLASS => "person",
        CAR_CLASS => "car",
        MOTORCYCLE_CLASS => "motorcycle",
        BUS_CLASS => "bus",
        TRUCK_CLASS => "truck",
        _ => "unknown",
    }
}

/// One raw model output: class, box, confidence. No filtering applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BBox,
}

impl RawDetection {
    pub fn new(class_id: u32, confidence: f32, bbox: BBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}

/// A classified detection as reported to consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: String,
    pub bbox: BBox,
    pub confidence: f32,
    /// Reserved for multi-frame tracking; always `None` in this core.
    pub track_id: Option<u64>,
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        Self {
            class_id: raw.class_id,
            class_name: class_name(raw.class_id).to_string(),
            bbox: raw.bbox,
            confidence: raw.confidence,
            track_id: None,
        }
    }
}

/// Object-detection model boundary.
///
/// # Audit Boundary
///
/// Implementations run with full process privileges and see raw pixels.
/// They must treat the frame as read-only and must not retain it beyond the
/// `infer` call.
pub trait ObjectModel: Send {
    /// Model identifier for logs.
    fn name(&self) -> &'static str;

    /// Run one detection pass over a frame.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once at detector construction. Failure
    /// here means the model is unavailable and startup must abort.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_class_set_matches_coco_ids() {
        assert!(is_vehicle_class(CAR_CLASS));
        assert!(is_vehicle_class(MOTORCYCLE_CLASS));
        assert!(is_vehicle_class(BUS_CLASS));
        assert!(is_vehicle_class(TRUCK_CLASS));
        assert!(!is_vehicle_class(PERSON_CLASS));
        assert!(!is_vehicle_class(42));
    }

    #[test]
    fn detection_carries_class_name() {
        let det: Detection =
            RawDetection::new(MOTORCYCLE_CLASS, 0.8, BBox::new(0, 0, 10, 10)).into();
        assert_eq!(det.class_name, "motorcycle");
        assert!(det.track_id.is_none());
    }
}

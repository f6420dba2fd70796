use anyhow::{Context, Result};

use super::classify::{
    AssumeCompliant, HelmetClassifier, NoPlateReader, PlateReader, SeatbeltClassifier,
};
use super::model::{is_vehicle_class, ObjectModel, RawDetection, CAR_CLASS, MOTORCYCLE_CLASS, PERSON_CLASS};
use super::plate::normalize_plate;
use super::Detection;
use crate::frame::Frame;
use crate::{BBox, LicensePlateInfo, Violation, ViolationKind, ViolationSet};

/// Tunables for the detection pass.
#[derive(Clone, Copy, Debug)]
pub struct DetectorConfig {
    /// Detections below this confidence are discarded before rule
    /// evaluation.
    pub min_confidence: f32,
    /// Rider association radius in pixels, applied per axis to the distance
    /// between box centers (a box test, not Euclidean distance).
    pub rider_radius_px: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            rider_radius_px: 100,
        }
    }
}

/// Stateless-per-call wrapper around the detection model plus the violation
/// rules. Each public operation runs its own inference pass; there is no
/// cross-call caching, so callers needing vehicles and violations for the
/// same frame call both.
pub struct Detector {
    model: Box<dyn ObjectModel>,
    helmet: Box<dyn HelmetClassifier>,
    seatbelt: Box<dyn SeatbeltClassifier>,
    plates: Box<dyn PlateReader>,
    config: DetectorConfig,
}

impl Detector {
    /// Build a detector around a model. Runs the model's warm-up; failure
    /// means the model is unavailable and startup must abort.
    pub fn new(mut model: Box<dyn ObjectModel>, config: DetectorConfig) -> Result<Self> {
        model
            .warm_up()
            .with_context(|| format!("detection model '{}' unavailable", model.name()))?;
        Ok(Self {
            model,
            helmet: Box::new(AssumeCompliant),
            seatbelt: Box::new(AssumeCompliant),
            plates: Box::new(NoPlateReader),
            config,
        })
    }

    pub fn with_helmet_classifier(mut self, classifier: Box<dyn HelmetClassifier>) -> Self {
        self.helmet = classifier;
        self
    }

    pub fn with_seatbelt_classifier(mut self, classifier: Box<dyn SeatbeltClassifier>) -> Self {
        self.seatbelt = classifier;
        self
    }

    pub fn with_plate_reader(mut self, reader: Box<dyn PlateReader>) -> Self {
        self.plates = reader;
        self
    }

    /// One inference pass, degraded to empty on failure. A malformed frame
    /// or a model runtime error must never take down the capture loop.
    fn run_model(&mut self, frame: &Frame) -> Vec<RawDetection> {
        match self.model.infer(frame) {
            Ok(detections) => detections
                .into_iter()
                .filter(|d| d.confidence >= self.config.min_confidence && d.bbox.is_valid())
                .collect(),
            Err(e) => {
                log::warn!(
                    "inference failed on frame from {}: {:#}; treating as empty",
                    frame.source_id,
                    e
                );
                Vec::new()
            }
        }
    }

    /// Detect vehicles in the frame. Empty when nothing matches.
    pub fn detect_vehicles(&mut self, frame: &Frame) -> Vec<Detection> {
        self.run_model(frame)
            .into_iter()
            .filter(|d| is_vehicle_class(d.class_id))
            .map(Detection::from)
            .collect()
    }

    /// Evaluate the violation rules over one frame.
    ///
    /// All four kinds are present in the result, each possibly empty.
    /// `WrongWay` stays empty: it needs direction tracking across frames,
    /// which is an extension point, not part of this pass.
    pub fn detect_violations(&mut self, frame: &Frame) -> ViolationSet {
        let detections = self.run_model(frame);
        let mut violations = ViolationSet::new();

        for detection in &detections {
            match detection.class_id {
                MOTORCYCLE_CLASS => {
                    let riders = find_riders(
                        &detections,
                        detection.bbox,
                        self.config.rider_radius_px,
                    );

                    for rider in &riders {
                        if !self.helmet.is_wearing_helmet(frame, rider.bbox) {
                            violations.push(Violation {
                                kind: ViolationKind::NoHelmet,
                                bbox: rider.bbox,
                                confidence: rider.confidence,
                                vehicle_bbox: Some(detection.bbox),
                                rider_count: None,
                            });
                        }
                    }

                    if riders.len() >= 3 {
                        violations.push(Violation {
                            kind: ViolationKind::TripleRiding,
                            bbox: detection.bbox,
                            confidence: detection.confidence,
                            vehicle_bbox: Some(detection.bbox),
                            rider_count: Some(riders.len() as u32),
                        });
                    }
                }
                CAR_CLASS => {
                    if !self.seatbelt.is_wearing_seatbelt(frame, detection.bbox) {
                        violations.push(Violation {
                            kind: ViolationKind::NoSeatbelt,
                            bbox: detection.bbox,
                            confidence: detection.confidence,
                            vehicle_bbox: Some(detection.bbox),
                            rider_count: None,
                        });
                    }
                }
                _ => {}
            }
        }

        violations
    }

    /// Best-effort plate recognition for a vehicle region. Recognized text
    /// is normalized; a read that fails the plate pattern is discarded.
    pub fn detect_license_plate(
        &mut self,
        frame: &Frame,
        vehicle_bbox: BBox,
    ) -> Option<LicensePlateInfo> {
        let raw = self.plates.read_plate(frame, vehicle_bbox)?;
        match normalize_plate(&raw.number) {
            Some(number) => Some(LicensePlateInfo { number, ..raw }),
            None => {
                log::debug!("discarding unparseable plate read '{}'", raw.number);
                None
            }
        }
    }
}

/// Persons whose box center lies within `radius_px` of the motorcycle's box
/// center on both axes.
fn find_riders(detections: &[RawDetection], bike_bbox: BBox, radius_px: i32) -> Vec<RawDetection> {
    let (bike_cx, bike_cy) = bike_bbox.center();
    detections
        .iter()
        .filter(|d| d.class_id == PERSON_CLASS)
        .filter(|d| {
            let (cx, cy) = d.bbox.center();
            (cx - bike_cx).abs() < radius_px && (cy - bike_cy).abs() < radius_px
        })
        .copied()
        .collect()
}

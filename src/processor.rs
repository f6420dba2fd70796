//! Per-frame orchestration.
//!
//! [`FrameProcessor::process`] is the single entry point for one frame.
//! Both call sites (the streaming loop and the ad-hoc single-frame
//! submission path) route through it, so detection logic cannot diverge
//! between them. For one frame it:
//!
//! 1. runs the vehicle and violation passes,
//! 2. updates the traffic analyzer with the vehicle count,
//! 3. hands violations to the recorder (which emits `Violation` events),
//! 4. annotates a working copy of the frame,
//! 5. emits `VehicleCount` and `FrameProcessed` events.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use crate::analyzer::TrafficAnalyzer;
use crate::annotate::annotate;
use crate::detect::{Detection, Detector};
use crate::events::{EventBus, EventPayload, FrameSummary};
use crate::frame::Frame;
use crate::record::ViolationRecorder;
use crate::ViolationSet;

/// Everything one processed frame produced.
#[derive(Debug)]
pub struct FrameReport {
    /// Working copy of the input with detection/violation boxes drawn.
    pub annotated: Frame,
    pub vehicles: Vec<Detection>,
    pub violations: ViolationSet,
    /// Evidence records persisted for this frame.
    pub records_written: usize,
}

/// Orchestrates detector, analyzer, recorder, and event bus for one frame.
pub struct FrameProcessor {
    detector: Detector,
    recorder: ViolationRecorder,
    analyzer: Arc<Mutex<TrafficAnalyzer>>,
    bus: Arc<EventBus>,
}

impl FrameProcessor {
    pub fn new(
        detector: Detector,
        recorder: ViolationRecorder,
        analyzer: Arc<Mutex<TrafficAnalyzer>>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            detector,
            recorder,
            analyzer,
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Process one frame.
    ///
    /// Deterministic given the frame and the injected model/classifier
    /// state. Detection and persistence failures degrade internally; the
    /// only error out of here is a poisoned analyzer lock, which means a
    /// writer panicked and the pipeline is done for.
    pub fn process(&mut self, frame: &Frame) -> Result<FrameReport> {
        let vehicles = self.detector.detect_vehicles(frame);
        let violations = self.detector.detect_violations(frame);

        {
            let mut analyzer = self
                .analyzer
                .lock()
                .map_err(|_| anyhow!("traffic analyzer lock poisoned"))?;
            analyzer.update(vehicles.len() as u32);
        }

        let Self {
            detector,
            recorder,
            bus,
            ..
        } = self;
        let records_written = recorder.record_all(
            frame,
            &violations,
            &mut |bbox| detector.detect_license_plate(frame, bbox),
            bus,
        );

        let mut annotated = frame.working_copy();
        annotate(&mut annotated, &vehicles, &violations);

        self.bus.dispatch(&EventPayload::VehicleCount {
            timestamp_ms: frame.timestamp_ms,
            count: vehicles.len() as u32,
        });
        self.bus.dispatch(&EventPayload::FrameProcessed(FrameSummary {
            timestamp_ms: frame.timestamp_ms,
            source_id: frame.source_id.clone(),
            vehicle_count: vehicles.len() as u32,
            violation_counts: violations.counts(),
        }));

        Ok(FrameReport {
            annotated,
            vehicles,
            violations,
            records_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectorConfig, RawDetection, ScriptedModel, CAR_CLASS, MOTORCYCLE_CLASS, PERSON_CLASS};
    use crate::events::EventKind;
    use crate::{BBox, ViolationKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn processor_with(scene: Vec<RawDetection>, dir: &std::path::Path) -> FrameProcessor {
        let detector = Detector::new(
            Box::new(ScriptedModel::fixed(scene)),
            DetectorConfig::default(),
        )
        .expect("detector");
        FrameProcessor::new(
            detector,
            ViolationRecorder::new(dir).expect("recorder"),
            Arc::new(Mutex::new(TrafficAnalyzer::new())),
            Arc::new(EventBus::new()),
        )
    }

    #[test]
    fn empty_frame_yields_pristine_copy_and_empty_lists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut processor = processor_with(Vec::new(), dir.path());
        let frame = Frame::filled(32, 32, [40, 40, 40], 7, "stub://cam");

        let report = processor.process(&frame).expect("process");

        assert!(report.vehicles.is_empty());
        for kind in ViolationKind::ALL {
            assert!(report.violations.list(kind).is_empty());
        }
        assert_eq!(report.records_written, 0);
        // Nothing drawn: the annotated frame equals the input copy.
        assert_eq!(report.annotated.pixels(), frame.pixels());
    }

    #[test]
    fn analyzer_sees_every_frame() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scene = vec![
            RawDetection::new(CAR_CLASS, 0.9, BBox::new(0, 0, 20, 12)),
            RawDetection::new(CAR_CLASS, 0.8, BBox::new(30, 0, 60, 12)),
        ];
        let mut processor = processor_with(scene, dir.path());
        let frame = Frame::filled(64, 64, [0, 0, 0], 0, "stub://cam");

        processor.process(&frame).expect("process");
        processor.process(&frame).expect("process");

        let analyzer = processor.analyzer.lock().unwrap();
        assert_eq!(analyzer.len(), 2);
        assert_eq!(analyzer.latest().unwrap().vehicle_count, 2);
    }

    #[test]
    fn events_fire_in_order_with_violations_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bike = RawDetection::new(MOTORCYCLE_CLASS, 0.9, BBox::new(20, 20, 44, 56));
        let mut scene = vec![bike];
        for i in 0..3 {
            scene.push(RawDetection::new(
                PERSON_CLASS,
                0.8,
                bike.bbox.translate(i * 4, -8),
            ));
        }

        let detector = Detector::new(
            Box::new(ScriptedModel::fixed(scene)),
            DetectorConfig::default(),
        )
        .expect("detector");
        let bus = Arc::new(EventBus::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            EventKind::Violation,
            EventKind::VehicleCount,
            EventKind::FrameProcessed,
        ] {
            let order = order.clone();
            bus.register(kind, move |payload| {
                order.lock().unwrap().push(payload.kind());
                Ok(())
            });
        }

        let mut processor = FrameProcessor::new(
            detector,
            ViolationRecorder::new(dir.path()).expect("recorder"),
            Arc::new(Mutex::new(TrafficAnalyzer::new())),
            bus,
        );
        let frame = Frame::filled(128, 128, [0, 0, 0], 0, "stub://cam");
        let report = processor.process(&frame).expect("process");

        assert_eq!(report.records_written, 1);
        let order = order.lock().unwrap();
        assert_eq!(
            *order,
            vec![
                EventKind::Violation,
                EventKind::VehicleCount,
                EventKind::FrameProcessed
            ]
        );
    }

    #[test]
    fn handler_failures_never_reach_the_processor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let detector = Detector::new(
            Box::new(ScriptedModel::fixed(vec![RawDetection::new(
                CAR_CLASS,
                0.9,
                BBox::new(0, 0, 30, 20),
            )])),
            DetectorConfig::default(),
        )
        .expect("detector");
        let bus = Arc::new(EventBus::new());
        let fired = Arc::new(AtomicUsize::new(0));
        bus.register(EventKind::FrameProcessed, |_| {
            Err(anyhow::anyhow!("subscriber exploded"))
        });
        let fired_clone = fired.clone();
        bus.register(EventKind::FrameProcessed, move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut processor = FrameProcessor::new(
            detector,
            ViolationRecorder::new(dir.path()).expect("recorder"),
            Arc::new(Mutex::new(TrafficAnalyzer::new())),
            bus,
        );
        let frame = Frame::filled(64, 64, [0, 0, 0], 0, "stub://cam");
        assert!(processor.process(&frame).is_ok());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}

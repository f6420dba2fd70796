//! End-to-end pipeline run against the synthetic capture source: evidence
//! lands on disk, events fan out, and the worker honors its start/stop
//! contract.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use roadwatch::capture::{CaptureConfig, StubSource};
use roadwatch::detect::{RawDetection, ScriptedModel, CAR_CLASS, MOTORCYCLE_CLASS, PERSON_CLASS};
use roadwatch::{
    BBox, Detector, DetectorConfig, EventBus, EventKind, EventPayload, Frame, FrameProcessor,
    LicensePlateInfo, StreamWorker, TrafficAnalyzer, ViolationKind, ViolationRecord,
    ViolationRecorder,
};

/// A busy intersection scene: one car without a seatbelt and a motorcycle
/// carrying three bare-headed riders.
fn violation_scene() -> Vec<RawDetection> {
    let bike = BBox::new(300, 200, 360, 290);
    let mut scene = vec![
        RawDetection::new(CAR_CLASS, 0.95, BBox::new(40, 180, 220, 300)),
        RawDetection::new(MOTORCYCLE_CLASS, 0.9, bike),
    ];
    for i in 0..3 {
        scene.push(RawDetection::new(
            PERSON_CLASS,
            0.8,
            bike.translate(i * 12 - 12, -50),
        ));
    }
    scene
}

fn build_worker(
    output_dir: &std::path::Path,
    bus: Arc<EventBus>,
) -> StreamWorker {
    let detector = Detector::new(
        Box::new(ScriptedModel::fixed(violation_scene())),
        DetectorConfig::default(),
    )
    .expect("detector")
    .with_helmet_classifier(Box::new(|_: &Frame, _: BBox| false))
    .with_seatbelt_classifier(Box::new(|_: &Frame, _: BBox| false))
    .with_plate_reader(Box::new(|_: &Frame, bbox: BBox| {
        Some(LicensePlateInfo {
            number: "ka 05 mx 2291".to_string(),
            confidence: 0.85,
            bbox,
        })
    }));

    let analyzer = Arc::new(Mutex::new(TrafficAnalyzer::new()));
    let processor = FrameProcessor::new(
        detector,
        ViolationRecorder::new(output_dir).expect("recorder"),
        analyzer.clone(),
        bus,
    );
    StreamWorker::new(processor, analyzer)
}

fn stub_source() -> Box<StubSource> {
    Box::new(StubSource::new(CaptureConfig {
        url: "stub://smoke".to_string(),
        target_fps: 30,
        width: 640,
        height: 480,
    }))
}

#[test]
fn streaming_pipeline_persists_evidence_and_fans_out_events() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = Arc::new(EventBus::new());
    let records: Arc<Mutex<Vec<ViolationRecord>>> = Arc::new(Mutex::new(Vec::new()));

    let records_sub = records.clone();
    bus.register(EventKind::Violation, move |payload| {
        if let EventPayload::Violation(record) = payload {
            records_sub.lock().unwrap().push(record.clone());
        }
        Ok(())
    });

    let worker = build_worker(dir.path(), bus);
    worker.start(stub_source()).expect("start");

    // Each frame yields 5 violations (3 riders + triple riding + seatbelt);
    // wait for a few frames' worth of evidence.
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if records.lock().unwrap().len() >= 10 {
            break;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    worker.stop();

    let records = records.lock().unwrap();
    assert!(
        records.len() >= 10,
        "expected at least 10 violation events, saw {}",
        records.len()
    );

    // Every record's evidence pair is on disk and the sidecar round-trips.
    for record in records.iter() {
        assert!(record.image_path.exists(), "missing {}", record.image_path.display());
        let sidecar = record.image_path.with_extension("json");
        let parsed: ViolationRecord =
            serde_json::from_slice(&std::fs::read(&sidecar).expect("sidecar")).expect("parse");
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.source_id, "stub://smoke");
    }

    // Ids are globally unique across the run.
    let mut ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    let before = ids.len();
    ids.dedup();
    assert_eq!(ids.len(), before, "violation record ids must not collide");

    // The seatbelt records carry the recognized (normalized) plate.
    let seatbelt = records
        .iter()
        .find(|r| r.kind == ViolationKind::NoSeatbelt)
        .expect("seatbelt violation");
    assert_eq!(
        seatbelt.plate.as_ref().map(|p| p.number.as_str()),
        Some("KA05MX2291")
    );

    // Triple riding was seen with its rider count.
    let triple = records
        .iter()
        .find(|r| r.kind == ViolationKind::TripleRiding)
        .expect("triple riding violation");
    assert_eq!(triple.rider_count, Some(3));
}

#[test]
fn adhoc_submission_matches_streaming_semantics() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = Arc::new(EventBus::new());
    let worker = build_worker(dir.path(), bus);

    let frame = Frame::filled(640, 480, [30, 30, 30], 42, "upload://clip-7");
    let report = worker.submit_frame(&frame).expect("submit");

    assert_eq!(report.vehicles.len(), 2);
    assert_eq!(report.violations.list(ViolationKind::NoHelmet).len(), 3);
    assert_eq!(report.violations.list(ViolationKind::TripleRiding).len(), 1);
    assert_eq!(report.violations.list(ViolationKind::NoSeatbelt).len(), 1);
    assert!(report.violations.list(ViolationKind::WrongWay).is_empty());
    assert_eq!(report.records_written, 5);

    let status = worker.status().expect("status");
    assert!(!status.is_running);
    assert_eq!(status.frame_count, 1);
    assert_eq!(status.current_vehicle_count, 2);
    assert_eq!(status.current_violation_counts.no_helmet, 3);
    // One frame with two vehicles in the analyzer window.
    assert!((status.traffic_density - 2.0).abs() < 1e-9);
    assert_eq!(status.predicted_congestion, 2.0);
}

#[test]
fn worker_restart_cycle_is_clean() {
    let dir = tempfile::tempdir().expect("tempdir");
    let worker = build_worker(dir.path(), Arc::new(EventBus::new()));

    worker.start(stub_source()).expect("first start");
    assert!(worker.start(stub_source()).is_err());
    worker.stop();
    worker.stop();
    worker.start(stub_source()).expect("restart");
    worker.stop();
}

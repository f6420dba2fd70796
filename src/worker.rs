//! Stream worker.
//!
//! [`StreamWorker`] owns the capture resource and the cancellation flag,
//! and runs the capture/process loop on one dedicated background thread.
//! Everything else (status queries, ad-hoc single-frame submission, event
//! subscription) happens on caller threads concurrently with that worker.
//!
//! All frame processing, streaming and ad-hoc alike, is serialized through
//! one `Mutex<FrameProcessor>`; the shared metrics sit under their own
//! mutex so a status query never waits on an in-flight inference pass.
//!
//! Cancellation is cooperative: a stop request is observed between frames,
//! never mid-inference. `stop` waits a bounded ~5 s for the loop to wind
//! down and then detaches; the worker thread drops the capture source
//! exactly once on exit either way.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::analyzer::TrafficAnalyzer;
use crate::capture::CaptureSource;
use crate::frame::Frame;
use crate::processor::{FrameProcessor, FrameReport};
use crate::ViolationCounts;

/// Sleep after a failed frame read before retrying.
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Pacing sleep after each processed frame to bound CPU usage.
const FRAME_PACING: Duration = Duration::from_millis(10);
/// FPS is recomputed once per window of wall clock.
const FPS_WINDOW: Duration = Duration::from_secs(1);
/// How long `stop` waits for the loop before detaching.
const STOP_WAIT: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(50);

const DEFAULT_DENSITY_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_FORECAST_LOOKAHEAD: Duration = Duration::from_secs(5 * 60);

/// Read-only pipeline snapshot, recomputed on every query.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessorStatus {
    pub is_running: bool,
    pub fps: f64,
    pub frame_count: u64,
    pub current_vehicle_count: u32,
    pub current_violation_counts: ViolationCounts,
    pub traffic_density: f64,
    pub predicted_congestion: f64,
}

#[derive(Debug, Default)]
struct StreamMetrics {
    fps: f64,
    frame_count: u64,
    vehicle_count: u32,
    violation_counts: ViolationCounts,
    /// Most recent annotated frame, for display surfaces (MJPEG, snapshots).
    last_annotated: Option<Frame>,
}

/// Runs the cancellable capture loop and serves status queries.
pub struct StreamWorker {
    pipeline: Arc<Mutex<FrameProcessor>>,
    analyzer: Arc<Mutex<TrafficAnalyzer>>,
    metrics: Arc<Mutex<StreamMetrics>>,
    cancel: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    density_window: Duration,
    forecast_lookahead: Duration,
}

impl StreamWorker {
    pub fn new(processor: FrameProcessor, analyzer: Arc<Mutex<TrafficAnalyzer>>) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(processor)),
            analyzer,
            metrics: Arc::new(Mutex::new(StreamMetrics::default())),
            cancel: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            density_window: DEFAULT_DENSITY_WINDOW,
            forecast_lookahead: DEFAULT_FORECAST_LOOKAHEAD,
        }
    }

    /// Override the windows `status` uses for density and forecast.
    pub fn with_windows(mut self, density_window: Duration, forecast_lookahead: Duration) -> Self {
        self.density_window = density_window;
        self.forecast_lookahead = forecast_lookahead;
        self
    }

    /// Launch the capture loop on a background thread.
    ///
    /// Fails when a worker is already active for this instance, and when
    /// the source refuses to connect (fatal: the camera/file is
    /// unavailable at startup).
    pub fn start(&self, mut source: Box<dyn CaptureSource + Send>) -> Result<()> {
        let mut slot = self
            .handle
            .lock()
            .map_err(|_| anyhow!("worker handle lock poisoned"))?;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                return Err(anyhow!("stream worker is already running"));
            }
        }
        // Reap a previously finished worker before relaunching.
        if let Some(handle) = slot.take() {
            let _ = handle.join();
        }

        source.connect().context("capture source unavailable")?;
        self.cancel.store(false, Ordering::SeqCst);

        let pipeline = self.pipeline.clone();
        let metrics = self.metrics.clone();
        let cancel = self.cancel.clone();
        let handle = std::thread::spawn(move || run_loop(pipeline, metrics, cancel, source));
        *slot = Some(handle);
        Ok(())
    }

    /// Request cancellation and wait (bounded) for the worker to exit.
    ///
    /// Stopping an already-stopped worker is a no-op. If the loop is stuck
    /// in a long inference call past the wait bound, the thread is detached
    /// and releases the capture source whenever it finally observes the
    /// flag.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let handle = {
            let mut slot = match self.handle.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.take()
        };
        let Some(handle) = handle else {
            return;
        };

        let deadline = Instant::now() + STOP_WAIT;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(STOP_POLL);
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            log::warn!(
                "worker did not stop within {:?}; detaching (inference calls are not preempted)",
                STOP_WAIT
            );
        }
    }

    pub fn is_running(&self) -> bool {
        let slot = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Ad-hoc single-frame submission.
    ///
    /// Routes through the same processor (and the same mutex) as the
    /// streaming loop, so a submitted frame gets identical detection
    /// semantics and the loop never races it.
    pub fn submit_frame(&self, frame: &Frame) -> Result<FrameReport> {
        let mut pipeline = self
            .pipeline
            .lock()
            .map_err(|_| anyhow!("frame processor lock poisoned"))?;
        let report = pipeline.process(frame)?;
        drop(pipeline);

        let mut metrics = lock_metrics(&self.metrics);
        metrics.frame_count += 1;
        metrics.vehicle_count = report.vehicles.len() as u32;
        metrics.violation_counts = report.violations.counts();
        metrics.last_annotated = Some(report.annotated.working_copy());
        Ok(report)
    }

    /// The most recently processed (annotated) frame, if any.
    pub fn latest_frame(&self) -> Option<Frame> {
        lock_metrics(&self.metrics).last_annotated.clone()
    }

    /// Snapshot of the pipeline state. Never persisted; recomputed per
    /// query from the live metrics and analyzer.
    pub fn status(&self) -> Result<ProcessorStatus> {
        let (fps, frame_count, vehicle_count, violation_counts) = {
            let metrics = lock_metrics(&self.metrics);
            (
                metrics.fps,
                metrics.frame_count,
                metrics.vehicle_count,
                metrics.violation_counts,
            )
        };
        let (traffic_density, predicted_congestion) = {
            let analyzer = self
                .analyzer
                .lock()
                .map_err(|_| anyhow!("traffic analyzer lock poisoned"))?;
            (
                analyzer.density(self.density_window),
                analyzer.predict_congestion(self.forecast_lookahead),
            )
        };
        Ok(ProcessorStatus {
            is_running: self.is_running(),
            fps,
            frame_count,
            current_vehicle_count: vehicle_count,
            current_violation_counts: violation_counts,
            traffic_density,
            predicted_congestion,
        })
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_metrics(metrics: &Mutex<StreamMetrics>) -> MutexGuard<'_, StreamMetrics> {
    match metrics.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn run_loop(
    pipeline: Arc<Mutex<FrameProcessor>>,
    metrics: Arc<Mutex<StreamMetrics>>,
    cancel: Arc<AtomicBool>,
    mut source: Box<dyn CaptureSource + Send>,
) {
    let mut window_start = Instant::now();
    let mut window_frames = 0u64;

    while !cancel.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                // Transient: a dropped stream or decode hiccup must not
                // kill the loop.
                log::warn!("frame read failed: {:#}; retrying", e);
                std::thread::sleep(READ_RETRY_DELAY);
                continue;
            }
        };

        let report = {
            let mut guard = match pipeline.lock() {
                Ok(guard) => guard,
                Err(_) => {
                    log::error!("frame processor lock poisoned; stopping capture loop");
                    break;
                }
            };
            guard.process(&frame)
        };

        match report {
            Ok(report) => {
                window_frames += 1;
                let mut m = lock_metrics(&metrics);
                m.frame_count += 1;
                m.vehicle_count = report.vehicles.len() as u32;
                m.violation_counts = report.violations.counts();
                m.last_annotated = Some(report.annotated);
            }
            Err(e) => log::error!("frame processing failed: {:#}", e),
        }

        let elapsed = window_start.elapsed();
        if elapsed >= FPS_WINDOW {
            let mut m = lock_metrics(&metrics);
            m.fps = window_frames as f64 / elapsed.as_secs_f64();
            drop(m);
            window_frames = 0;
            window_start = Instant::now();
        }

        std::thread::sleep(FRAME_PACING);
    }

    let stats = source.stats();
    log::info!(
        "capture loop stopped for {} after {} frames",
        stats.source,
        stats.frames_captured
    );
    // `source` drops here, releasing the capture resource exactly once.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureConfig, StubSource};
    use crate::detect::{Detector, DetectorConfig, ScriptedModel};
    use crate::events::EventBus;
    use crate::record::ViolationRecorder;

    fn worker(dir: &std::path::Path) -> StreamWorker {
        let detector = Detector::new(
            Box::new(ScriptedModel::empty()),
            DetectorConfig::default(),
        )
        .expect("detector");
        let analyzer = Arc::new(Mutex::new(TrafficAnalyzer::new()));
        let processor = FrameProcessor::new(
            detector,
            ViolationRecorder::new(dir).expect("recorder"),
            analyzer.clone(),
            Arc::new(EventBus::new()),
        );
        StreamWorker::new(processor, analyzer)
    }

    fn stub_source() -> Box<dyn CaptureSource + Send> {
        Box::new(StubSource::new(CaptureConfig {
            url: "stub://worker-test".to_string(),
            target_fps: 30,
            width: 32,
            height: 24,
        }))
    }

    fn wait_for_frames(worker: &StreamWorker, at_least: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if worker.status().unwrap().frame_count >= at_least {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("worker produced no frames in time");
    }

    #[test]
    fn second_start_without_stop_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let worker = worker(dir.path());

        worker.start(stub_source()).expect("first start");
        let err = worker.start(stub_source());
        assert!(err.is_err());

        worker.stop();
        assert!(!worker.is_running());
        // After a stop the worker can be relaunched.
        worker.start(stub_source()).expect("restart");
        worker.stop();
    }

    #[test]
    fn stop_on_stopped_worker_is_a_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let worker = worker(dir.path());
        worker.stop();
        worker.stop();
        assert!(!worker.is_running());
    }

    #[test]
    fn loop_processes_frames_and_updates_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let worker = worker(dir.path());
        worker.start(stub_source()).expect("start");

        wait_for_frames(&worker, 3);
        let status = worker.status().expect("status");
        assert!(status.is_running);
        assert!(status.frame_count >= 3);
        assert_eq!(status.current_vehicle_count, 0);

        worker.stop();
        let status = worker.status().expect("status");
        assert!(!status.is_running);
    }

    #[test]
    fn submit_frame_works_without_a_running_loop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let worker = worker(dir.path());
        let frame = Frame::filled(32, 24, [0, 0, 0], 0, "adhoc");

        let report = worker.submit_frame(&frame).expect("submit");
        assert!(report.vehicles.is_empty());
        assert_eq!(worker.status().unwrap().frame_count, 1);
        assert!(worker.latest_frame().is_some());
    }

    #[test]
    fn connect_failure_surfaces_from_start() {
        struct DeadCamera;
        impl CaptureSource for DeadCamera {
            fn connect(&mut self) -> Result<()> {
                Err(anyhow!("device busy"))
            }
            fn next_frame(&mut self) -> Result<Frame> {
                Err(anyhow!("not connected"))
            }
            fn is_healthy(&self) -> bool {
                false
            }
            fn stats(&self) -> crate::capture::CaptureStats {
                crate::capture::CaptureStats {
                    frames_captured: 0,
                    source: "dead".to_string(),
                }
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let worker = worker(dir.path());
        let err = worker.start(Box::new(DeadCamera)).unwrap_err();
        assert!(err.to_string().contains("capture source unavailable"));
        assert!(!worker.is_running());
    }
}

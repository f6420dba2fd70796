//! roadwatchd - traffic violation pipeline daemon
//!
//! This daemon:
//! 1. Opens the configured capture source (stub scene or still directory)
//! 2. Runs the capture loop: detection, violation rules, traffic analyzer
//! 3. Persists evidence (JPEG crop + JSON sidecar) per violation
//! 4. Logs violation events from its own event-bus subscription
//! 5. Serves a periodic status line until ctrl-c

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roadwatch::detect::{ObjectModel, SyntheticTrafficModel};
use roadwatch::{
    open_source, Detector, EventBus, EventKind, EventPayload, FrameProcessor, RoadwatchConfig,
    StreamWorker, TrafficAnalyzer, ViolationRecorder,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "roadwatchd", about = "Traffic violation pipeline daemon")]
struct Args {
    /// Config file (TOML).
    #[arg(long, env = "ROADWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Capture source override: stub://<name> or a directory of stills.
    #[arg(long)]
    source: Option<String>,

    /// Evidence output directory override.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Detection model backend.
    #[arg(long, default_value = "synthetic")]
    model: String,
}

fn build_model(name: &str) -> Result<Box<dyn ObjectModel>> {
    match name {
        "synthetic" => Ok(Box::new(SyntheticTrafficModel::new())),
        other => Err(anyhow!(
            "model backend '{}' is not built in (available: synthetic)",
            other
        )),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = RoadwatchConfig::load_with(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(output_dir) = args.output_dir {
        cfg.output_dir = output_dir;
    }

    let model = build_model(&args.model)?;
    let detector = Detector::new(model, cfg.detection)?;
    let recorder = ViolationRecorder::new(&cfg.output_dir)?;
    let analyzer = Arc::new(Mutex::new(TrafficAnalyzer::with_capacity(
        cfg.analyzer.history_capacity,
    )));
    let bus = Arc::new(EventBus::new());

    bus.register(EventKind::Violation, |payload| {
        if let EventPayload::Violation(record) = payload {
            log::info!(
                "violation {}: {} conf={:.2} plate={} image={}",
                record.id,
                record.kind.slug(),
                record.confidence,
                record
                    .plate
                    .as_ref()
                    .map(|p| p.number.as_str())
                    .unwrap_or("-"),
                record.image_path.display()
            );
        }
        Ok(())
    });

    let processor = FrameProcessor::new(detector, recorder, analyzer.clone(), bus);
    let worker = StreamWorker::new(processor, analyzer)
        .with_windows(cfg.analyzer.density_window, cfg.analyzer.forecast_lookahead);

    let source = open_source(&cfg.source)?;
    worker.start(source)?;
    log::info!(
        "roadwatchd running. source={} evidence={}",
        cfg.source.url,
        cfg.output_dir.display()
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })?;

    let mut last_status = std::time::Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
        if last_status.elapsed() >= STATUS_INTERVAL {
            match worker.status() {
                Ok(status) => log::info!(
                    "status: fps={:.1} frames={} vehicles={} density={:.2} forecast={:.2}",
                    status.fps,
                    status.frame_count,
                    status.current_vehicle_count,
                    status.traffic_density,
                    status.predicted_congestion
                ),
                Err(e) => log::warn!("status query failed: {:#}", e),
            }
            last_status = std::time::Instant::now();
        }
    }

    log::info!("shutting down");
    worker.stop();
    log::info!("roadwatchd stopped");
    Ok(())
}

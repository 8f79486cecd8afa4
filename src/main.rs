// src/main.rs

mod alerts;
mod config;
mod detector;
mod pipeline;
mod source;
mod tracking;
mod transport;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{ConfigOrigin, DEFAULT_CONFIG_PATH};
use detector::Detector;
use pipeline::{CountSnapshot, DriverOutputs, PipelineDriver, PipelineMetrics};
use source::replay::{ReplayDetector, ReplaySource};
use source::FrameSource;
use transport::{dispatcher, HttpTransport, JsonlTransport, TelemetrySender, TelemetryTask, Transport};
use types::{Config, SourceKind, TransportConfig, TransportKind};

#[derive(Parser, Debug)]
#[command(
    name = "passenger_counter",
    version,
    about = "Counts people crossing a line in a video stream and raises occupancy alerts"
)]
struct Cli {
    /// YAML config file (default: ./config.yaml if present)
    #[arg(short, long)]
    config: Option<String>,

    /// Override video.source (replay file, video path, camera index or URL)
    #[arg(short, long)]
    source: Option<String>,

    /// Log level for this crate; takes precedence over RUST_LOG and the config
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, origin) = Config::load_or_default(cli.config.as_deref())?;
    init_tracing(cli.log_level.as_deref(), &config.logging.level);

    info!("🚌 Passenger Counter Starting");
    match origin {
        ConfigOrigin::File => info!("✓ Configuration loaded"),
        ConfigOrigin::BuiltIn => warn!(
            "⚠️  {} not found, using built-in defaults",
            DEFAULT_CONFIG_PATH
        ),
    }

    config.apply_env_overrides();
    if let Some(source) = cli.source {
        config.video.source = source;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        "Counting: line at {:.0}% width, min movement {}px | tracking: max distance {}px, {} frames grace",
        config.counting.line_position * 100.0,
        config.counting.min_movement_px,
        config.tracking.max_distance,
        config.tracking.max_disappeared
    );
    info!("Dashboard link: {}", config.safety.dashboard_link);

    let (mut source, mut detector) = open_input(&config)?;
    let first_frame = pipeline::read_first_frame(source.as_mut())?;
    info!(
        "✓ Source ready: {} ({}x{})",
        source.describe(),
        first_frame.width,
        first_frame.height
    );

    let metrics = PipelineMetrics::new();
    let driver = PipelineDriver::new(&config, &first_frame, metrics.clone())?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, stopping after the current frame");
            let _ = stop_tx.send(true);
        }
    });

    let (counts_tx, counts_rx) = watch::channel(CountSnapshot::default());
    let (telemetry, telemetry_task) =
        start_telemetry(&config, counts_rx, stop_rx.clone(), metrics.clone())
            .await
            .unzip();

    let outputs = DriverOutputs {
        telemetry,
        counts: counts_tx,
    };
    let summary = tokio::task::spawn_blocking(move || {
        driver.run(
            first_frame,
            source.as_mut(),
            detector.as_mut(),
            outputs,
            stop_rx,
        )
    })
    .await
    .context("Frame loop crashed")?;

    if let Some(task) = telemetry_task {
        task.finish().await;
    }

    metrics.log_report();
    info!(
        "🏁 Final after {} frames: {} entered, {} inside, status {:?} | alerts: low occupancy {:?}, door close {:?} ({} door alerts){}",
        summary.frames,
        summary.counts.total_entered,
        summary.counts.count_inside,
        summary.dashboard.status,
        summary.low_occupancy_alert,
        summary.door_close_alert,
        summary.door_alerts,
        if summary.stopped_by_signal {
            " (stopped early)"
        } else {
            ""
        }
    );

    Ok(())
}

fn init_tracing(cli_level: Option<&str>, config_level: &str) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(format!("passenger_counter={},ort=warn", level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("passenger_counter={},ort=warn", config_level))
        }),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_input(config: &Config) -> Result<(Box<dyn FrameSource>, Box<dyn Detector>)> {
    match config.video.kind {
        SourceKind::Replay => {
            let source = ReplaySource::open(&config.video.source)?;
            let detector = ReplayDetector::new(&config.detector);
            Ok((Box::new(source), Box::new(detector)))
        }
        SourceKind::Video => open_video(config),
    }
}

#[cfg(feature = "vision")]
fn open_video(config: &Config) -> Result<(Box<dyn FrameSource>, Box<dyn Detector>)> {
    let source = source::video::VideoSource::open(&config.video.source)?;
    let detector = detector::yolo::YoloDetector::new(&config.detector)?;
    Ok((Box::new(source), Box::new(detector)))
}

#[cfg(not(feature = "vision"))]
fn open_video(_config: &Config) -> Result<(Box<dyn FrameSource>, Box<dyn Detector>)> {
    anyhow::bail!("video.kind = video needs a build with `--features vision`")
}

/// `None` means counting runs without telemetry.
async fn start_telemetry(
    config: &Config,
    counts: watch::Receiver<CountSnapshot>,
    shutdown: watch::Receiver<bool>,
    metrics: PipelineMetrics,
) -> Option<(TelemetrySender, TelemetryTask)> {
    let transport_config = &config.transport;
    if !transport_config.enabled {
        info!("📡 Telemetry disabled");
        return None;
    }

    match transport_config.kind {
        TransportKind::Http => match HttpTransport::new(transport_config) {
            Ok(transport) => {
                connect_and_spawn(transport, transport_config, counts, shutdown, metrics).await
            }
            Err(e) => {
                warn!("⚠️  {} (counting continues, no telemetry)", e);
                None
            }
        },
        TransportKind::Jsonl => {
            let transport = JsonlTransport::new(&transport_config.jsonl_path);
            connect_and_spawn(transport, transport_config, counts, shutdown, metrics).await
        }
    }
}

async fn connect_and_spawn<T: Transport>(
    transport: T,
    config: &TransportConfig,
    counts: watch::Receiver<CountSnapshot>,
    shutdown: watch::Receiver<bool>,
    metrics: PipelineMetrics,
) -> Option<(TelemetrySender, TelemetryTask)> {
    if let Err(e) = transport.connect().await {
        warn!(
            "⚠️  {} transport: {} (counting continues, no telemetry)",
            transport.name(),
            e
        );
        return None;
    }
    info!("✓ {} transport connected", transport.name());
    Some(dispatcher::spawn(transport, config, counts, shutdown, metrics))
}

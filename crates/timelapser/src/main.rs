use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timelapser::{
    config::Config,
    models::{Camera, CameraHealth, CameraStatus, Timelapse, TimelapseStatus},
    repositories::memory::{
        InMemoryCameraRepository, InMemorySettingsProvider, InMemoryTimelapseRepository,
    },
    scheduling::{
        CaptureTimingCalculator, JobQueue, SchedulerAuthority, TimingSettings, TriggerEngine,
        TriggerHandler,
    },
};

#[derive(Parser)]
#[command(name = "timelapser")]
#[command(version)]
#[command(about = "Capture scheduling daemon for timelapse camera rigs")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "timelapser.toml")]
    config: String,

    /// TOML seed of cameras and timelapses for the in-memory repositories
    #[arg(short, long, value_name = "FILE")]
    seed: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

/// Demo data loaded at startup; the production data layer replaces this
#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    cameras: Vec<SeedCamera>,
    #[serde(default)]
    timelapses: Vec<SeedTimelapse>,
    /// Settings-provider overrides (min/max interval, grace period, timezone)
    #[serde(default)]
    settings: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SeedCamera {
    id: i64,
    name: String,
    #[serde(default = "default_camera_status")]
    status: String,
    #[serde(default = "default_camera_health")]
    health: String,
}

#[derive(Debug, Deserialize)]
struct SeedTimelapse {
    id: i64,
    camera_id: i64,
    name: String,
    #[serde(default = "default_timelapse_status")]
    status: String,
    capture_interval_seconds: i64,
    #[serde(default)]
    time_window_start: Option<String>,
    #[serde(default)]
    time_window_end: Option<String>,
}

fn default_camera_status() -> String {
    "active".to_string()
}

fn default_camera_health() -> String {
    "online".to_string()
}

fn default_timelapse_status() -> String {
    "running".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("timelapser={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting timelapser v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_from_file(&cli.config)?;
    config.validate()?;
    info!("Configuration loaded from: {}", cli.config);

    let cameras = Arc::new(InMemoryCameraRepository::new());
    let timelapses = Arc::new(InMemoryTimelapseRepository::new());
    let settings = Arc::new(InMemorySettingsProvider::new());

    if let Some(seed_path) = &cli.seed {
        let seed: SeedFile = toml::from_str(&std::fs::read_to_string(seed_path)?)?;
        load_seed(&seed, &cameras, &timelapses, &settings).await;
        info!(
            "Seeded {} camera(s) and {} timelapse(s) from {}",
            seed.cameras.len(),
            seed.timelapses.len(),
            seed_path
        );
    }

    let timing = TimingSettings::resolve(settings.as_ref(), &config.timing).await;
    let calculator = CaptureTimingCalculator::new(timing);
    let engine = Arc::new(TriggerEngine::new(&config.scheduler));
    let queue = Arc::new(JobQueue::new(config.queue.max_pending));
    let authority = Arc::new(SchedulerAuthority::new(
        engine.clone(),
        queue,
        cameras,
        timelapses,
        calculator,
        config.scheduler.clone(),
    ));

    let shutdown = CancellationToken::new();

    let handler: Arc<dyn TriggerHandler> = authority.clone();
    let engine_task = {
        let engine = engine.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { engine.run(handler, token).await })
    };

    // Give the dispatch loop a moment to come up before the first sync;
    // if it still is not running, the periodic reconciliation heals it.
    for _ in 0..50 {
        if engine.is_running() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let report = authority.sync_running_timelapses().await;
    if report.success {
        info!(
            "Initial reconciliation: {} job(s) scheduled for {} running timelapse(s)",
            report.added, report.total_running
        );
    } else {
        warn!(
            "Initial reconciliation failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    let sync_task = {
        let authority = authority.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { authority.run_sync_loop(token).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    shutdown.cancel();

    if let Err(e) = engine_task.await? {
        error!("Trigger engine exited with error: {}", e);
    }
    sync_task.await?;

    info!("Shutdown complete");
    Ok(())
}

async fn load_seed(
    seed: &SeedFile,
    cameras: &InMemoryCameraRepository,
    timelapses: &InMemoryTimelapseRepository,
    settings: &InMemorySettingsProvider,
) {
    for (key, value) in &seed.settings {
        settings.set(key, value).await;
    }

    for cam in &seed.cameras {
        cameras
            .upsert(Camera {
                id: cam.id,
                name: cam.name.clone(),
                status: CameraStatus::from_str(&cam.status),
                health_status: CameraHealth::from_str(&cam.health),
                last_capture_at: None,
            })
            .await;
    }

    for tl in &seed.timelapses {
        timelapses
            .upsert(Timelapse {
                id: tl.id,
                camera_id: tl.camera_id,
                name: tl.name.clone(),
                status: TimelapseStatus::from_str(&tl.status),
                capture_interval_seconds: tl.capture_interval_seconds,
                time_window_start: tl.time_window_start.clone(),
                time_window_end: tl.time_window_end.clone(),
                created_at: Utc::now(),
            })
            .await;
    }
}

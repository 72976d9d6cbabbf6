//! Camera server: cached high-resolution stills plus live MJPEG streams
//! from a single sensor

use std::path::PathBuf;
use std::sync::Arc;

use camserve::capture::{Sensor, SyntheticSensor, V4l2Sensor};
use camserve::server::{self, AppState};
use camserve::still::{LatestCapture, RefreshPolicy, RefreshScheduler};
use camserve::stream::SessionRegistry;
use camserve::utils::{self, FoundDevice};
use camserve::{CameraArbiter, Config, SensorBackend};
use color_eyre::{eyre::WrapErr, Result};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    info!("camserve launching...");

    // Load configuration
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("CAMSERVE_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("camserve.toml"));
    let config = Config::load(Some(&config_path))
        .wrap_err_with(|| format!("Failed to load configuration from {}", config_path.display()))?;
    debug!(?config, "Configuration loaded");

    let sensor = open_sensor(&config).await?;
    let arbiter = CameraArbiter::new(sensor, config.capture_deadline());

    // Still refresher
    let cache = Arc::new(LatestCapture::new());
    let scheduler = RefreshScheduler::new(
        arbiter.clone(),
        cache.clone(),
        RefreshPolicy::from_config(&config),
    );
    let refresh = scheduler.stats();
    let refresh_handle = scheduler.spawn();

    // Stream slots, with completions drained into the log
    let (registry, completions) = SessionRegistry::new(config.stream.max_sessions);
    tokio::spawn(async move {
        while let Ok(done) = completions.recv_async().await {
            info!(
                session = done.id,
                state = done.state.label(),
                frames = done.frames_sent,
                "Stream slot reclaimed"
            );
        }
    });

    let state = Arc::new(AppState {
        cache,
        arbiter,
        registry: Arc::new(registry),
        refresh,
        frame_pacing: config.frame_pacing(),
        channel_depth: config.stream.channel_depth,
    });

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", config.server.bind))?;

    server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
    })
    .await
    .wrap_err("Web server error")?;

    refresh_handle.abort();
    info!("camserve shutting down");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camserve=info"));
    let registry = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()),
    );

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

async fn open_sensor(config: &Config) -> Result<Box<dyn Sensor>> {
    let mode = config.sensor.stream_mode;
    match config.sensor.backend {
        SensorBackend::Synthetic => {
            info!("Using synthetic sensor");
            Ok(Box::new(SyntheticSensor::new(mode)))
        }
        SensorBackend::V4l2 => {
            // Auto-detect capture device if needed
            let device = if config.sensor.device.is_empty() {
                utils::auto_detect_device().await?
            } else {
                FoundDevice::new(config.sensor.device.clone(), String::new())
            };
            info!("Using capture device: {:?}", device);

            let sensor = V4l2Sensor::open(&device, config.sensor.buffer_count, mode)?;
            Ok(Box::new(sensor))
        }
    }
}

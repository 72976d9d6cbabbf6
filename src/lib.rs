pub mod arbiter;
pub mod capture;
pub mod error;
pub mod server;
pub mod still;
pub mod stream;
pub mod utils;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use capture::frame::ResolutionMode;
use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

pub use arbiter::CameraArbiter;
pub use capture::Frame;
pub use error::{CaptureError, TransportError};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CAMSERVE";

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub sensor: SensorConfig,
    pub still: StillConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorBackend {
    V4l2,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub backend: SensorBackend,
    /// Device path; empty means auto-detect
    pub device: String,
    pub buffer_count: u32,
    /// Mode the sensor sits in between still refreshes
    pub stream_mode: ResolutionMode,
    /// Upper bound on a single camera critical section
    pub capture_deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StillConfig {
    pub mode: ResolutionMode,
    pub refresh_interval_secs: u64,
    pub startup_attempts: u32,
    pub startup_retry_delay_ms: u64,
    pub capture_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub max_sessions: usize,
    pub frame_pacing_ms: u64,
    /// Chunks buffered between a session and its HTTP body
    pub channel_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            },
            sensor: SensorConfig {
                backend: SensorBackend::V4l2,
                device: String::new(),
                buffer_count: 2,
                stream_mode: ResolutionMode::Vga,
                capture_deadline_ms: 5_000,
            },
            still: StillConfig {
                mode: ResolutionMode::Uxga,
                refresh_interval_secs: 300,
                startup_attempts: 10,
                startup_retry_delay_ms: 200,
                capture_attempts: 3,
            },
            stream: StreamConfig {
                max_sessions: 4,
                frame_pacing_ms: 1,
                channel_depth: 1,
            },
        }
    }
}

impl Config {
    /// Defaults, then the TOML file at `path` if it exists, then
    /// `CAMSERVE_*` environment variables (`__` separates sections, as in
    /// `CAMSERVE_SERVER__BIND`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config: Config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.still.capture_attempts == 0 {
            return Err(ConfigError::Message("still.capture_attempts must be at least 1".into()));
        }
        if self.still.refresh_interval_secs == 0 {
            return Err(ConfigError::Message(
                "still.refresh_interval_secs must be at least 1".into(),
            ));
        }
        if self.stream.max_sessions == 0 {
            return Err(ConfigError::Message("stream.max_sessions must be at least 1".into()));
        }
        Ok(())
    }

    pub fn capture_deadline(&self) -> Duration {
        Duration::from_millis(self.sensor.capture_deadline_ms)
    }

    pub fn frame_pacing(&self) -> Duration {
        Duration::from_millis(self.stream.frame_pacing_ms)
    }
}

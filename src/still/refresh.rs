//! Periodic high-resolution still capture

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam::utils::CachePadded;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::arbiter::CameraArbiter;
use crate::capture::{ResolutionMode, Sensor};
use crate::error::CaptureError;
use crate::still::cache::{copy_bytes, CachedStill, LatestCapture};
use crate::Config;

/// Timing and retry knobs for still capture
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub still_mode: ResolutionMode,
    pub stream_mode: ResolutionMode,
    pub capture_attempts: u32,
    pub interval: Duration,
    pub startup_attempts: u32,
    pub startup_retry_delay: Duration,
}

impl RefreshPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            still_mode: config.still.mode,
            stream_mode: config.sensor.stream_mode,
            capture_attempts: config.still.capture_attempts,
            interval: Duration::from_secs(config.still.refresh_interval_secs),
            startup_attempts: config.still.startup_attempts,
            startup_retry_delay: Duration::from_millis(config.still.startup_retry_delay_ms),
        }
    }
}

/// Refresh outcome counters
#[derive(Default)]
pub struct RefreshStats {
    counters: CachePadded<Counters>,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl RefreshStats {
    /// (succeeded, failed)
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.counters.succeeded.load(Ordering::Relaxed),
            self.counters.failed.load(Ordering::Relaxed),
        )
    }
}

/// Keeps the latest-capture cache fresh.
pub struct RefreshScheduler {
    arbiter: CameraArbiter,
    cache: Arc<LatestCapture>,
    policy: RefreshPolicy,
    stats: Arc<RefreshStats>,
}

impl RefreshScheduler {
    pub fn new(arbiter: CameraArbiter, cache: Arc<LatestCapture>, policy: RefreshPolicy) -> Self {
        Self {
            arbiter,
            cache,
            policy,
            stats: Arc::new(RefreshStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<RefreshStats> {
        self.stats.clone()
    }

    /// One capture cycle. On failure the cached still is left alone.
    #[instrument(skip(self), fields(mode = ?self.policy.still_mode))]
    pub async fn refresh_once(&self) -> Result<usize, CaptureError> {
        let policy = self.policy;
        let captured = self
            .arbiter
            .with_camera_exclusive(move |sensor| capture_still(sensor, &policy))
            .await
            .and_then(|inner| inner);

        match captured {
            Ok(bytes) => {
                let len = bytes.len();
                self.cache.replace(CachedStill::new(bytes));
                self.stats.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("camserve_refresh_total", "outcome" => "ok").increment(1);
                info!(bytes = len, "Still refreshed");
                Ok(len)
            }
            Err(e) => {
                self.stats.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("camserve_refresh_total", "outcome" => "failed").increment(1);
                warn!(error = %e, "Still refresh failed, keeping previous still");
                Err(e)
            }
        }
    }

    /// Startup retries, stopping at the first success
    pub async fn warm_up(&self) -> bool {
        for attempt in 1..=self.policy.startup_attempts {
            if self.refresh_once().await.is_ok() {
                return true;
            }
            if attempt < self.policy.startup_attempts {
                tokio::time::sleep(self.policy.startup_retry_delay).await;
            }
        }
        warn!(
            attempts = self.policy.startup_attempts,
            "No still captured at startup, waiting for the next scheduled refresh"
        );
        false
    }

    pub async fn run(self) {
        self.warm_up().await;

        let period = self.policy.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            // Failures are logged and retried on the next tick
            let _ = self.refresh_once().await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Puts the sensor back into its streaming mode when dropped.
struct ModeRestore<'a> {
    sensor: &'a mut dyn Sensor,
    restore: ResolutionMode,
}

impl<'a> Deref for ModeRestore<'a> {
    type Target = dyn Sensor + 'a;

    fn deref(&self) -> &Self::Target {
        self.sensor
    }
}

impl<'a> DerefMut for ModeRestore<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.sensor
    }
}

impl Drop for ModeRestore<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sensor.set_resolution_mode(self.restore) {
            warn!(error = %e, "Failed to restore streaming resolution");
        }
    }
}

/// Critical section of a refresh: switch mode, drop the warm-up frame,
/// then take the first frame that validates at the still size.
fn capture_still(sensor: &mut dyn Sensor, policy: &RefreshPolicy) -> Result<Bytes, CaptureError> {
    let mut sensor = ModeRestore {
        sensor,
        restore: policy.stream_mode,
    };
    sensor.set_resolution_mode(policy.still_mode)?;

    // First frame after a mode switch carries stale sensor settings
    if let Some(stale) = sensor.acquire_frame() {
        sensor.release_frame(stale);
    }

    let expected = policy.still_mode.dimensions();
    let mut last = CaptureError::HardwareUnavailable;

    for attempt in 1..=policy.capture_attempts {
        let Some(frame) = sensor.acquire_frame() else {
            debug!(attempt, "Sensor returned no frame");
            last = CaptureError::HardwareUnavailable;
            continue;
        };

        match frame.validate(Some(expected)) {
            Ok(()) => {
                let copied = copy_bytes(&frame.data);
                sensor.release_frame(frame);
                return copied;
            }
            Err(defect) => {
                debug!(attempt, %defect, "Discarding invalid still");
                metrics::counter!("camserve_invalid_frames_total").increment(1);
                sensor.release_frame(frame);
                last = defect.into();
            }
        }
    }

    Err(last)
}

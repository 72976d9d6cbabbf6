//! Camera arbitration: the single gate in front of the sensor

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::capture::Sensor;
use crate::error::CaptureError;

/// Serializes every hardware interaction (mode changes and frame pulls).
///
/// Waiters queue on an async mutex without timeout. The enclosed closure runs
/// on the blocking pool because driver calls block the calling thread.
#[derive(Clone)]
pub struct CameraArbiter {
    sensor: Arc<Mutex<Box<dyn Sensor>>>,
    deadline: Duration,
}

impl CameraArbiter {
    pub fn new(sensor: Box<dyn Sensor>, deadline: Duration) -> Self {
        Self {
            sensor: Arc::new(Mutex::new(sensor)),
            deadline,
        }
    }

    /// Run `f` as the sole hardware accessor.
    ///
    /// The lock is released when `f` returns or unwinds. If `f` outlives the
    /// deadline the caller gets [`CaptureError::Deadline`] while the lock
    /// stays with the stuck driver call until it finishes.
    pub async fn with_camera_exclusive<F, R>(&self, f: F) -> Result<R, CaptureError>
    where
        F: FnOnce(&mut dyn Sensor) -> R + Send + 'static,
        R: Send + 'static,
    {
        let guard = Arc::clone(&self.sensor).lock_owned().await;

        let section = tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            f(&mut **guard)
        });

        match tokio::time::timeout(self.deadline, section).await {
            Ok(Ok(out)) => Ok(out),
            Ok(Err(e)) => Err(CaptureError::Aborted(e.to_string())),
            Err(_) => {
                warn!(deadline = ?self.deadline, "Camera critical section overran its deadline");
                Err(CaptureError::Deadline(self.deadline))
            }
        }
    }
}

use crate::capture::frame::{Frame, ResolutionMode};
use crate::error::CaptureError;

/// Raw sensor driver.
///
/// Implementations are not expected to be thread-safe beyond `Send`; all
/// calls are serialized by [`crate::arbiter::CameraArbiter`].
pub trait Sensor: Send + 'static {
    /// Pull the next encoded frame, or `None` if the hardware produced nothing.
    fn acquire_frame(&mut self) -> Option<Frame>;

    /// Hand a frame back to the driver's buffer pool.
    fn release_frame(&mut self, frame: Frame);

    /// Reconfigure the sensor's output size.
    fn set_resolution_mode(&mut self, mode: ResolutionMode) -> Result<(), CaptureError>;
}

//! Error taxonomy for hardware access and client transports

use std::time::Duration;

use thiserror::Error;

use crate::capture::frame::{PixelFormat, ResolutionMode};

/// Failures raised while talking to the sensor or handling captured bytes.
///
/// Every variant is contained to the operation that raised it: the refresh
/// scheduler retries on its next tick, a stream session closes itself.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("sensor returned no frame")]
    HardwareUnavailable,

    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] FrameDefect),

    #[error("could not allocate {len} bytes for a frame copy")]
    Allocation { len: usize },

    #[error("failed to switch sensor to {mode:?}: {reason}")]
    ModeSwitch { mode: ResolutionMode, reason: String },

    #[error("camera critical section exceeded {0:?}")]
    Deadline(Duration),

    #[error("camera critical section aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why a frame failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameDefect {
    #[error("expected JPEG, got {0:?}")]
    Format(PixelFormat),

    #[error("payload of {0} bytes is too short")]
    TooShort(usize),

    #[error("missing JPEG start-of-image marker")]
    MissingSoi,

    #[error("expected {expected:?}, got {actual:?}")]
    Dimensions {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Write-side failures of a streaming client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer went away; the body receiver has been dropped.
    #[error("peer closed the connection")]
    Closed,

    #[error("transport rejected write: {0}")]
    Rejected(String),
}

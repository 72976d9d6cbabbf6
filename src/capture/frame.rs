use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::FrameDefect;

/// JPEG start-of-image marker
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Encoded frame handed out by the sensor.
///
/// Deliberately not `Clone`: a frame is owned by whoever holds it between
/// `acquire_frame` and `release_frame`.
#[derive(Debug)]
pub struct Frame {
    /// Pre-encoded payload, passed through untouched
    pub data: Bytes,

    /// Frame metadata
    pub meta: FrameMetadata,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Pixel formats a sensor may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Jpeg,
    Yuyv,
    Rgb565,
    Grayscale,
}

/// Sensor frame sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    Qvga,
    Vga,
    Svga,
    Xga,
    Hd,
    Sxga,
    Uxga,
}

impl ResolutionMode {
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Qvga => (320, 240),
            Self::Vga => (640, 480),
            Self::Svga => (800, 600),
            Self::Xga => (1024, 768),
            Self::Hd => (1280, 720),
            Self::Sxga => (1280, 1024),
            Self::Uxga => (1600, 1200),
        }
    }
}

impl Frame {
    pub fn new(data: Bytes, meta: FrameMetadata) -> Self {
        Self {
            data,
            meta,
            timestamp: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check that the frame is a plausible JPEG, optionally of a given size.
    ///
    /// Checks run in order: format tag, length, start-of-image marker, then
    /// dimensions when `expected` is given.
    pub fn validate(&self, expected: Option<(u32, u32)>) -> Result<(), FrameDefect> {
        if self.meta.format != PixelFormat::Jpeg {
            return Err(FrameDefect::Format(self.meta.format));
        }
        if self.data.len() < JPEG_SOI.len() {
            return Err(FrameDefect::TooShort(self.data.len()));
        }
        if self.data[..2] != JPEG_SOI {
            return Err(FrameDefect::MissingSoi);
        }
        if let Some(expected) = expected {
            let actual = (self.meta.width, self.meta.height);
            if actual != expected {
                return Err(FrameDefect::Dimensions { expected, actual });
            }
        }
        Ok(())
    }
}

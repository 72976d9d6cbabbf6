//! Hardware-free sensor producing JPEG-marked placeholder frames

use bytes::{BufMut, Bytes, BytesMut};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat, ResolutionMode, JPEG_EOI, JPEG_SOI};
use crate::capture::sensor::Sensor;
use crate::error::CaptureError;

/// Emulates a JPEG sensor, including the stale first frame after a mode
/// switch, which still carries the previous mode's dimensions.
pub struct SyntheticSensor {
    mode: ResolutionMode,
    stale_mode: Option<ResolutionMode>,
    sequence: u64,
}

impl SyntheticSensor {
    pub fn new(mode: ResolutionMode) -> Self {
        Self {
            mode,
            stale_mode: None,
            sequence: 0,
        }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    fn payload(&self, width: u32, height: u32) -> Bytes {
        // Roughly 1:100 of raw RGB, enough to look like a real JPEG on the wire
        let body = (width as usize * height as usize * 3) / 100;
        let mut buf = BytesMut::with_capacity(body + 4);
        buf.put_slice(&JPEG_SOI);
        for i in 0..body {
            buf.put_u8(((i as u64 * 17 + self.sequence) % 251) as u8);
        }
        buf.put_slice(&JPEG_EOI);
        buf.freeze()
    }
}

impl Sensor for SyntheticSensor {
    fn acquire_frame(&mut self) -> Option<Frame> {
        let mode = self.stale_mode.take().unwrap_or(self.mode);
        let (width, height) = mode.dimensions();
        self.sequence += 1;

        Some(Frame::new(
            self.payload(width, height),
            FrameMetadata {
                sequence: self.sequence,
                width,
                height,
                format: PixelFormat::Jpeg,
            },
        ))
    }

    fn release_frame(&mut self, _frame: Frame) {}

    fn set_resolution_mode(&mut self, mode: ResolutionMode) -> Result<(), CaptureError> {
        if mode != self.mode {
            self.stale_mode = Some(self.mode);
            self.mode = mode;
        }
        Ok(())
    }
}

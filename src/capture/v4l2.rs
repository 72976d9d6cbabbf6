//! V4L2 MJPEG sensor backed by memory-mapped streaming buffers

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat, ResolutionMode};
use crate::capture::sensor::Sensor;
use crate::error::CaptureError;
use crate::utils::FoundDevice;

const MJPG: &[u8; 4] = b"MJPG";

/// Camera driven through V4L2 with the MJPG fourcc, so payloads are
/// already JPEG and go out untouched.
pub struct V4l2Sensor {
    device: Device,
    stream: Option<MmapStream<'static>>,
    buffer_count: u32,
    mode: ResolutionMode,
    width: u32,
    height: u32,
    sequence: u64,
}

impl V4l2Sensor {
    /// Open the device and start streaming in `mode`
    pub fn open(found: &FoundDevice, buffer_count: u32, mode: ResolutionMode) -> Result<Self> {
        info!("Initializing V4L2 sensor: {:?}", found);

        let device = Device::with_path(&found.path)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(eyre!("Device doesn't support video capture"));
        }

        let mut sensor = Self {
            device,
            stream: None,
            buffer_count,
            mode,
            width: 0,
            height: 0,
            sequence: 0,
        };
        sensor.configure(mode)?;
        Ok(sensor)
    }

    /// Stop streaming, renegotiate the format and restart.
    fn configure(&mut self, mode: ResolutionMode) -> std::io::Result<()> {
        // The driver refuses S_FMT while buffers are mapped
        self.stream = None;

        let (width, height) = mode.dimensions();
        let mut fmt = self.device.format()?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = FourCC::new(MJPG);

        let applied = self.device.set_format(&fmt)?;
        if applied.fourcc != FourCC::new(MJPG) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("driver selected {} instead of MJPG", applied.fourcc),
            ));
        }
        if (applied.width, applied.height) != (width, height) {
            warn!(
                requested = ?(width, height),
                applied = ?(applied.width, applied.height),
                "Driver adjusted frame size"
            );
        }

        let stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)?;

        self.stream = Some(stream);
        self.mode = mode;
        self.width = applied.width;
        self.height = applied.height;
        info!(
            "Capture stream started at {}x{} with {} buffers",
            applied.width, applied.height, self.buffer_count
        );
        Ok(())
    }
}

impl Sensor for V4l2Sensor {
    #[instrument(skip(self), level = "trace")]
    fn acquire_frame(&mut self) -> Option<Frame> {
        let stream = self.stream.as_mut()?;

        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) => {
                warn!("Dequeue failed: {}", e);
                return None;
            }
        };

        // The mmap'd buffer is requeued on the next dequeue, so take a copy
        let used = (meta.bytesused as usize).min(buf.len());
        let data = Bytes::copy_from_slice(&buf[..used]);

        self.sequence += 1;

        Some(Frame::new(
            data,
            FrameMetadata {
                sequence: self.sequence,
                width: self.width,
                height: self.height,
                format: PixelFormat::Jpeg,
            },
        ))
    }

    fn release_frame(&mut self, frame: Frame) {
        debug!(sequence = frame.meta.sequence, "Frame released");
    }

    fn set_resolution_mode(&mut self, mode: ResolutionMode) -> Result<(), CaptureError> {
        if mode == self.mode && self.stream.is_some() {
            return Ok(());
        }
        self.configure(mode).map_err(|e| CaptureError::ModeSwitch {
            mode,
            reason: e.to_string(),
        })
    }
}

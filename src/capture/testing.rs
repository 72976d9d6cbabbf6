//! Scripted sensor that records every driver call

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat, ResolutionMode, JPEG_SOI};
use crate::capture::sensor::Sensor;
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCall {
    Acquire,
    Release,
    SetMode(ResolutionMode),
}

pub type CallLog = Arc<Mutex<Vec<SensorCall>>>;

/// Replays a queue of frames; an exhausted script returns `None`.
pub struct ScriptedSensor {
    script: VecDeque<Option<Frame>>,
    calls: CallLog,
    fail_mode: Option<ResolutionMode>,
}

impl ScriptedSensor {
    pub fn new(script: impl IntoIterator<Item = Option<Frame>>) -> (Self, CallLog) {
        let calls = CallLog::default();
        let sensor = Self {
            script: script.into_iter().collect(),
            calls: calls.clone(),
            fail_mode: None,
        };
        (sensor, calls)
    }

    /// Make switches to `mode` fail
    pub fn failing_mode(mut self, mode: ResolutionMode) -> Self {
        self.fail_mode = Some(mode);
        self
    }
}

impl Sensor for ScriptedSensor {
    fn acquire_frame(&mut self) -> Option<Frame> {
        self.calls.lock().unwrap().push(SensorCall::Acquire);
        self.script.pop_front().flatten()
    }

    fn release_frame(&mut self, _frame: Frame) {
        self.calls.lock().unwrap().push(SensorCall::Release);
    }

    fn set_resolution_mode(&mut self, mode: ResolutionMode) -> Result<(), CaptureError> {
        self.calls.lock().unwrap().push(SensorCall::SetMode(mode));
        if self.fail_mode == Some(mode) {
            return Err(CaptureError::ModeSwitch {
                mode,
                reason: "scripted failure".into(),
            });
        }
        Ok(())
    }
}

pub fn count(calls: &CallLog, call: SensorCall) -> usize {
    calls.lock().unwrap().iter().filter(|c| **c == call).count()
}

pub fn modes(calls: &CallLog) -> Vec<ResolutionMode> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter_map(|c| match c {
            SensorCall::SetMode(mode) => Some(*mode),
            _ => None,
        })
        .collect()
}

/// Valid JPEG frame at `mode`'s size whose body is `tag` repeated
pub fn jpeg(mode: ResolutionMode, tag: u8, body: usize) -> Frame {
    let mut data = JPEG_SOI.to_vec();
    data.extend(std::iter::repeat(tag).take(body));
    with_format(mode, PixelFormat::Jpeg, data)
}

pub fn with_format(mode: ResolutionMode, format: PixelFormat, data: Vec<u8>) -> Frame {
    let (width, height) = mode.dimensions();
    Frame::new(
        Bytes::from(data),
        FrameMetadata {
            sequence: 0,
            width,
            height,
            format,
        },
    )
}

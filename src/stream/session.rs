//! One MJPEG session per connected client

use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::arbiter::CameraArbiter;
use crate::capture::Sensor;
use crate::error::{CaptureError, TransportError};
use crate::still::cache::copy_bytes;
use crate::stream::part::{part_header, CONTENT_TYPE, DELIMITER};
use crate::stream::registry::SessionSlot;
use crate::stream::sink::PartSink;

/// Lifecycle of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Streaming,
    ClosedByPeer,
    ClosedByError,
    ClosedHardwareExhausted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Starting | Self::Streaming)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::ClosedByPeer => "closed_by_peer",
            Self::ClosedByError => "closed_by_error",
            Self::ClosedHardwareExhausted => "hardware_exhausted",
        }
    }
}

/// Pulls frames under the camera lock and writes them outside it.
///
/// A disconnected client is only noticed when a write fails, so a session
/// may pull one more frame after the peer has gone. Invalid frames are
/// skipped without limit and nothing is written for them: a sensor that
/// only ever produces invalid frames keeps the session, and its slot, alive
/// after the peer has left. Skips are paced like sent frames.
pub struct StreamSession<T> {
    slot: SessionSlot,
    arbiter: CameraArbiter,
    sink: T,
    pacing: Duration,
    state: SessionState,
    frames_sent: u64,
}

impl<T: PartSink> StreamSession<T> {
    pub fn new(slot: SessionSlot, arbiter: CameraArbiter, sink: T, pacing: Duration) -> Self {
        Self {
            slot,
            arbiter,
            sink,
            pacing,
            state: SessionState::Starting,
            frames_sent: 0,
        }
    }

    pub fn spawn(self) -> JoinHandle<SessionState> {
        tokio::spawn(self.run())
    }

    /// Stream until the first unrecoverable condition, then hand the slot back.
    #[instrument(skip(self), fields(session = self.slot.id()))]
    pub async fn run(mut self) -> SessionState {
        let state = self.stream().await;
        self.transition(state);

        info!(state = state.label(), frames = self.frames_sent, "Stream session closed");
        metrics::counter!("camserve_stream_sessions_total", "outcome" => state.label()).increment(1);

        self.slot.complete(state, self.frames_sent);
        state
    }

    async fn stream(&mut self) -> SessionState {
        if let Err(e) = self.sink.begin(CONTENT_TYPE) {
            warn!(error = %e, "Could not start multipart response");
            return SessionState::ClosedByError;
        }
        self.transition(SessionState::Streaming);

        loop {
            let payload = match next_frame(&self.arbiter, self.pacing).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Frame pull failed");
                    return closing_state(&e);
                }
            };

            if let Err(e) = self.send_part(payload).await {
                debug!(error = %e, "Write failed");
                return match e {
                    TransportError::Closed => SessionState::ClosedByPeer,
                    TransportError::Rejected(_) => SessionState::ClosedByError,
                };
            }

            self.frames_sent += 1;
            metrics::counter!("camserve_stream_frames_total").increment(1);
            tokio::time::sleep(self.pacing).await;
        }
    }

    /// Boundary, part header, payload, in that order
    async fn send_part(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.sink.write(Bytes::from_static(DELIMITER.as_bytes())).await?;
        self.sink.write(part_header(payload.len())).await?;
        self.sink.write(payload).await
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = self.state.label(), to = next.label(), "Session state change");
        self.state = next;
    }
}

/// Terminal state for a pull that failed
fn closing_state(e: &CaptureError) -> SessionState {
    match e {
        CaptureError::HardwareUnavailable | CaptureError::Deadline(_) => {
            SessionState::ClosedHardwareExhausted
        }
        _ => SessionState::ClosedByError,
    }
}

/// Next valid frame. Every pull, including retries after an invalid frame,
/// takes the lock afresh. Retries wait `pacing` first.
async fn next_frame(arbiter: &CameraArbiter, pacing: Duration) -> Result<Bytes, CaptureError> {
    loop {
        if let Some(payload) = arbiter.with_camera_exclusive(pull_frame).await?? {
            return Ok(payload);
        }
        if pacing.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(pacing).await;
        }
    }
}

/// Critical section of a stream pull: one frame, validated and copied out.
/// `Ok(None)` means the frame was invalid and has been skipped.
fn pull_frame(sensor: &mut dyn Sensor) -> Result<Option<Bytes>, CaptureError> {
    let frame = sensor.acquire_frame().ok_or(CaptureError::HardwareUnavailable)?;

    let payload = match frame.validate(None) {
        Ok(()) => copy_bytes(&frame.data).map(Some),
        Err(defect) => {
            debug!(%defect, "Skipping invalid frame");
            metrics::counter!("camserve_invalid_frames_total").increment(1);
            Ok(None)
        }
    };
    sensor.release_frame(frame);
    payload
}

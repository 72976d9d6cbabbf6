//! Write side of a streaming client

use std::convert::Infallible;
use std::future::Future;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::TransportError;

/// Where a stream session sends its bytes.
pub trait PartSink: Send + 'static {
    /// Announce the response content type. Called once, before any write.
    fn begin(&mut self, content_type: &'static str) -> Result<(), TransportError>;

    /// Send one chunk, waiting for the client to make room if needed.
    fn write(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Sink feeding an HTTP response body through a bounded channel.
///
/// The response is built from the [`ChannelSource`] half. When the client
/// goes away the body, and with it the receiver, is dropped, so disconnects
/// surface on the next write rather than immediately.
pub struct ChannelSink {
    started: Option<oneshot::Sender<&'static str>>,
    tx: flume::Sender<Result<Bytes, Infallible>>,
}

/// Response half of a [`ChannelSink`]
pub struct ChannelSource {
    pub started: oneshot::Receiver<&'static str>,
    pub body: flume::Receiver<Result<Bytes, Infallible>>,
}

pub fn channel(depth: usize) -> (ChannelSink, ChannelSource) {
    let (started_tx, started_rx) = oneshot::channel();
    let (tx, rx) = flume::bounded(depth);
    (
        ChannelSink {
            started: Some(started_tx),
            tx,
        },
        ChannelSource {
            started: started_rx,
            body: rx,
        },
    )
}

impl PartSink for ChannelSink {
    fn begin(&mut self, content_type: &'static str) -> Result<(), TransportError> {
        let started = self
            .started
            .take()
            .ok_or_else(|| TransportError::Rejected("response already started".into()))?;
        started.send(content_type).map_err(|_| TransportError::Closed)
    }

    fn write(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send {
        let tx = &self.tx;
        async move { tx.send_async(Ok(chunk)).await.map_err(|_| TransportError::Closed) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_then_writes_reach_the_body() {
        let (mut sink, source) = channel(4);

        sink.begin("multipart/x-mixed-replace").unwrap();
        assert_eq!(source.started.await.unwrap(), "multipart/x-mixed-replace");

        sink.write(Bytes::from_static(b"part")).await.unwrap();
        assert_eq!(source.body.recv_async().await.unwrap().unwrap(), Bytes::from_static(b"part"));
    }

    #[tokio::test]
    async fn second_begin_is_rejected() {
        let (mut sink, _source) = channel(1);
        sink.begin("a").unwrap();
        assert!(matches!(sink.begin("b"), Err(TransportError::Rejected(_))));
    }

    #[tokio::test]
    async fn dropped_body_reports_closed() {
        let (mut sink, source) = channel(1);
        drop(source);
        assert_eq!(sink.begin("a"), Err(TransportError::Closed));
        assert_eq!(sink.write(Bytes::new()).await, Err(TransportError::Closed));
    }
}

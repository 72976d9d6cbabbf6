//! End-to-end tests over a real listener, driven by the synthetic sensor.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camserve::capture::frame::ResolutionMode;
use camserve::capture::{Frame, Sensor, SyntheticSensor};
use camserve::server::{self, AppState};
use camserve::still::{LatestCapture, RefreshPolicy, RefreshScheduler};
use camserve::stream::part::{CONTENT_TYPE, DELIMITER};
use camserve::stream::{SessionCompletion, SessionRegistry, SessionState};
use camserve::{CameraArbiter, CaptureError};

// ── Shared helpers ───────────────────────────────────────────────────

/// Synthetic sensor that counts every driver call
struct Counting {
    inner: SyntheticSensor,
    calls: Arc<AtomicUsize>,
}

impl Sensor for Counting {
    fn acquire_frame(&mut self) -> Option<Frame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire_frame()
    }

    fn release_frame(&mut self, frame: Frame) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.release_frame(frame)
    }

    fn set_resolution_mode(&mut self, mode: ResolutionMode) -> Result<(), CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set_resolution_mode(mode)
    }
}

struct Harness {
    addr: SocketAddr,
    scheduler: RefreshScheduler,
    cache: Arc<LatestCapture>,
    calls: Arc<AtomicUsize>,
    completions: flume::Receiver<SessionCompletion>,
}

async fn start(max_sessions: usize) -> Harness {
    let calls = Arc::new(AtomicUsize::new(0));
    let sensor = Counting {
        inner: SyntheticSensor::new(ResolutionMode::Vga),
        calls: calls.clone(),
    };
    let arbiter = CameraArbiter::new(Box::new(sensor), Duration::from_secs(5));
    let cache = Arc::new(LatestCapture::new());
    let scheduler = RefreshScheduler::new(
        arbiter.clone(),
        cache.clone(),
        RefreshPolicy {
            still_mode: ResolutionMode::Uxga,
            stream_mode: ResolutionMode::Vga,
            capture_attempts: 3,
            interval: Duration::from_secs(300),
            startup_attempts: 1,
            startup_retry_delay: Duration::from_millis(1),
        },
    );
    let (registry, completions) = SessionRegistry::new(max_sessions);

    let state = Arc::new(AppState {
        cache: cache.clone(),
        arbiter,
        registry: Arc::new(registry),
        refresh: scheduler.stats(),
        frame_pacing: Duration::from_millis(1),
        channel_depth: 1,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, state, std::future::pending()));

    Harness {
        addr,
        scheduler,
        cache,
        calls,
        completions,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ── Still endpoint ───────────────────────────────────────────────────

#[tokio::test]
async fn still_is_unavailable_before_first_refresh() {
    let h = start(1).await;

    let resp = reqwest::get(format!("http://{}/capture", h.addr)).await.unwrap();

    assert_eq!(resp.status().as_u16(), 503);
    assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));
    assert!(!resp.text().await.unwrap().is_empty());
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn still_serves_refreshed_bytes() {
    let h = start(1).await;
    h.scheduler.refresh_once().await.unwrap();
    let cached = h.cache.read().unwrap().unwrap();

    let calls_before = h.calls.load(Ordering::SeqCst);
    let resp = reqwest::get(format!("http://{}/capture", h.addr)).await.unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    assert!(resp.headers()["cache-control"].to_str().unwrap().contains("no-store"));
    let body = resp.bytes().await.unwrap();
    assert_eq!(body, cached.bytes);
    assert_eq!(&body[..2], &[0xFF, 0xD8]);
    assert_eq!(h.calls.load(Ordering::SeqCst), calls_before);
}

// ── Stream endpoint ──────────────────────────────────────────────────

#[tokio::test]
async fn stream_emits_multipart_parts_and_frees_slot_on_disconnect() {
    let h = start(1).await;

    let mut resp = reqwest::get(format!("http://{}/stream", h.addr)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers()["content-type"], CONTENT_TYPE);

    let mut buf = Vec::new();
    while buf.windows(DELIMITER.len()).filter(|w| *w == DELIMITER.as_bytes()).count() < 2 {
        let chunk = resp.chunk().await.unwrap().expect("stream ended early");
        buf.extend_from_slice(&chunk);
    }

    assert!(buf.starts_with(DELIMITER.as_bytes()));
    let header_start = DELIMITER.len();
    let header_end = find(&buf, b"\r\n\r\n").unwrap() + 4;
    let header = std::str::from_utf8(&buf[header_start..header_end]).unwrap();
    assert!(header.starts_with("Content-Type: image/jpeg\r\n"));
    let len: usize = header
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let (w, h_px) = ResolutionMode::Vga.dimensions();
    assert_eq!(len, (w * h_px * 3 / 100) as usize + 4);
    assert_eq!(&buf[header_end..header_end + 2], &[0xFF, 0xD8]);
    assert_eq!(
        &buf[header_end + len..header_end + len + DELIMITER.len()],
        DELIMITER.as_bytes()
    );

    drop(resp);

    let done = tokio::time::timeout(Duration::from_secs(10), h.completions.recv_async())
        .await
        .expect("session never completed")
        .unwrap();
    assert_eq!(done.state, SessionState::ClosedByPeer);
    assert!(done.frames_sent >= 2);
}

#[tokio::test]
async fn stream_refused_when_slots_are_full() {
    let h = start(1).await;

    let first = reqwest::get(format!("http://{}/stream", h.addr)).await.unwrap();
    assert_eq!(first.status().as_u16(), 200);

    let second = reqwest::get(format!("http://{}/stream", h.addr)).await.unwrap();
    assert_eq!(second.status().as_u16(), 503);
}

#[tokio::test]
async fn status_reports_cache_and_sessions() {
    let h = start(3).await;
    h.scheduler.refresh_once().await.unwrap();

    let body = reqwest::get(format!("http://{}/status", h.addr))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status["still"]["available"], true);
    assert_eq!(status["refresh"]["succeeded"], 1);
    assert_eq!(status["sessions"]["capacity"], 3);
    assert_eq!(status["sessions"]["active"], 0);
}

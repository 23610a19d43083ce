//! MjpegServer (spec §4.2, component C2): the per-printer HTTP endpoint
//! multiplexer for MJPEG, snapshot, H.264-over-WebSocket, HLS/LL-HLS, status
//! and LED control. Route table and the builder pattern are carried over
//! from the project's structural ancestor's `StreamServer`/`StreamServerBuilder`
//! (`examples/retrontology-doorcam/src/streaming/server.rs`), generalized from
//! one fixed MJPEG route to the full endpoint table in spec §4.2.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::error::{AcproxycamError, Result, StreamError};
use crate::events::EventBus;
use crate::frame_hub::FrameHub;
use crate::hls::HlsSegmenter;

use super::client_counts::ClientCounts;
use super::handlers::{
    h264_ws_handler, hls_fragment_handler, hls_playlist_handler, led_get_handler, led_put_handler, snapshot_handler,
    status_handler, stream_handler,
};
use super::status::StatusCell;

#[async_trait::async_trait]
pub trait LedControl: Send + Sync {
    async fn get_led(&self) -> (bool, Option<u32>);
    async fn set_led(&self, on: bool, brightness: Option<u32>) -> Result<()>;
}

#[derive(Clone)]
pub struct ServerState {
    pub(crate) printer: String,
    pub(crate) frame_hub: Arc<FrameHub>,
    pub(crate) hls: Arc<HlsSegmenter>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) client_counts: Arc<ClientCounts>,
    pub(crate) status: Arc<StatusCell>,
    pub(crate) led: Arc<dyn LedControl>,
    pub(crate) max_fps: u32,
    pub(crate) idle_fps: u32,
    pub(crate) snapshot_deadline: Duration,
    pub(crate) hls_target_duration_secs: u32,
    pub(crate) hls_part_duration_secs: f64,
}

pub struct MjpegServer {
    bind_addr: SocketAddr,
    state: ServerState,
}

impl MjpegServer {
    pub fn new(bind_addr: SocketAddr, state: ServerState) -> Self {
        Self { bind_addr, state }
    }

    /// Lets the caller keep a handle to the shared status cell before
    /// `start` consumes the server, so it can push state transitions the
    /// server itself has no visibility into (decoder/MQTT lifecycle).
    pub fn status_cell(&self) -> Arc<StatusCell> {
        Arc::clone(&self.state.status)
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            .route("/stream", get(stream_handler))
            .route("/snapshot", get(snapshot_handler))
            .route("/h264", get(h264_ws_handler))
            .route("/hls/playlist.m3u8", get(hls_playlist_handler))
            .route("/hls/:filename", get(hls_fragment_handler))
            .route("/status", get(status_handler))
            .route("/led", get(led_get_handler).put(led_put_handler))
            .with_state(self.state.clone());

        info!(printer = %self.state.printer, addr = %self.bind_addr, "starting MjpegServer");

        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| StreamError::BindFailed { address: self.bind_addr.to_string(), source: e })?;

        axum::serve(listener, app)
            .await
            .map_err(|e| StreamError::StartupFailed(e.to_string()))?;

        Ok(())
    }
}

pub struct MjpegServerBuilder {
    printer: Option<String>,
    bind_addr: Option<SocketAddr>,
    frame_hub: Option<Arc<FrameHub>>,
    hls: Option<Arc<HlsSegmenter>>,
    event_bus: Option<Arc<EventBus>>,
    led: Option<Arc<dyn LedControl>>,
    max_fps: u32,
    idle_fps: u32,
    snapshot_deadline: Duration,
    hls_target_duration_secs: u32,
    hls_part_duration_secs: f64,
}

impl MjpegServerBuilder {
    pub fn new() -> Self {
        Self {
            printer: None,
            bind_addr: None,
            frame_hub: None,
            hls: None,
            event_bus: None,
            led: None,
            max_fps: 15,
            idle_fps: 1,
            snapshot_deadline: Duration::from_secs(2),
            hls_target_duration_secs: 2,
            hls_part_duration_secs: 0.5,
        }
    }

    pub fn printer(mut self, printer: impl Into<String>) -> Self {
        self.printer = Some(printer.into());
        self
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    pub fn frame_hub(mut self, frame_hub: Arc<FrameHub>) -> Self {
        self.frame_hub = Some(frame_hub);
        self
    }

    pub fn hls(mut self, hls: Arc<HlsSegmenter>) -> Self {
        self.hls = Some(hls);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn led(mut self, led: Arc<dyn LedControl>) -> Self {
        self.led = Some(led);
        self
    }

    pub fn max_fps(mut self, fps: u32) -> Self {
        self.max_fps = fps;
        self
    }

    pub fn idle_fps(mut self, fps: u32) -> Self {
        self.idle_fps = fps;
        self
    }

    pub fn snapshot_deadline(mut self, deadline: Duration) -> Self {
        self.snapshot_deadline = deadline;
        self
    }

    pub fn build(self) -> Result<MjpegServer> {
        let printer = self.printer.ok_or_else(|| AcproxycamError::system("printer name is required"))?;
        let bind_addr = self.bind_addr.ok_or_else(|| AcproxycamError::system("bind address is required"))?;
        let frame_hub = self.frame_hub.ok_or_else(|| AcproxycamError::system("frame hub is required"))?;
        let hls = self.hls.ok_or_else(|| AcproxycamError::system("hls segmenter is required"))?;
        let event_bus = self.event_bus.ok_or_else(|| AcproxycamError::system("event bus is required"))?;
        let led = self.led.ok_or_else(|| AcproxycamError::system("led control is required"))?;

        let state = ServerState {
            status: Arc::new(StatusCell::new(super::status::StatusView::initial(&printer))),
            printer,
            frame_hub,
            hls,
            event_bus,
            client_counts: ClientCounts::new(),
            led,
            max_fps: self.max_fps,
            idle_fps: self.idle_fps,
            snapshot_deadline: self.snapshot_deadline,
            hls_target_duration_secs: self.hls_target_duration_secs,
            hls_part_duration_secs: self.hls_part_duration_secs,
        };

        Ok(MjpegServer::new(bind_addr, state))
    }
}

impl Default for MjpegServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

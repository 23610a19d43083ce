//! ObicoServerClient (spec §4.8): WebSocket + REST client to the remote
//! Obico service. Receives passthru commands and remote-viewing state over
//! the WebSocket, sends throttled status updates, snapshot uploads, and
//! event posts over REST.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::config::ObicoConfig;
use crate::error::{ObicoError, Result};
use crate::frame::JpegFrame;

const STATUS_PUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewingState {
    Idle,
    Viewing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObicoPrintEvent {
    PrintStarted,
    Paused,
    Resumed,
    Done,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PassthruCommand {
    pub func: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub args: Value,
}

pub enum ObicoServerEvent {
    Passthru(PassthruCommand),
    CancelRequested,
    PauseRequested,
    ResumeRequested,
    ViewingStateChanged(ViewingState),
}

pub struct ObicoServerClient {
    http: HttpClient,
    config: ObicoConfig,
    ws_writer: tokio::sync::Mutex<futures::stream::SplitSink<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, Message>>,
    last_snapshot_sent: Mutex<Instant>,
    viewing_state: Mutex<ViewingState>,
    snapshot_sequence: AtomicU64,
}

impl ObicoServerClient {
    pub async fn connect(config: ObicoConfig, events: mpsc::Sender<ObicoServerEvent>) -> Result<Self> {
        let ws_url = format!("{}/ws/device/?auth_token={}", ws_base(&config.server_url), config.auth_token);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| ObicoError::ServerConnection(e.to_string()))?;
        let (ws_writer, ws_reader) = ws_stream.split();

        spawn_read_pump(ws_reader, events);

        Ok(Self {
            http: HttpClient::new(),
            config,
            ws_writer: tokio::sync::Mutex::new(ws_writer),
            last_snapshot_sent: Mutex::new(Instant::now() - Duration::from_secs(3600)),
            viewing_state: Mutex::new(ViewingState::Idle),
            snapshot_sequence: AtomicU64::new(0),
        })
    }

    pub fn set_viewing_state(&self, state: ViewingState) {
        *self.viewing_state.lock() = state;
    }

    /// Status updates are sent every [`STATUS_PUSH_INTERVAL`] unless an event
    /// forces an immediate push; callers pass `force` for the latter.
    pub async fn push_status(&self, status: Value, force: bool) -> Result<()> {
        static LAST_PUSH: AtomicU64 = AtomicU64::new(0);
        let now = now_millis();
        if !force && now.saturating_sub(LAST_PUSH.load(Ordering::Relaxed)) < STATUS_PUSH_INTERVAL.as_millis() as u64 {
            return Ok(());
        }
        LAST_PUSH.store(now, Ordering::Relaxed);

        let envelope = json!({ "status": status });
        self.send_ws(&envelope).await
    }

    pub async fn post_event(&self, event: ObicoPrintEvent) -> Result<()> {
        let url = format!("{}/api/v1/octo/events/", http_base(&self.config.server_url));
        self.http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.auth_token))
            .json(&event)
            .send()
            .await
            .map_err(|e| ObicoError::ServerConnection(e.to_string()))?;
        Ok(())
    }

    /// Snapshot upload cadence depends on tier and viewing state (spec §4.8):
    /// cloud-free 1/15s, cloud-pro 1/5s, local-idle 1/1s, local-viewing up to
    /// camera max fps (capped at 5/s here as the conservative reading).
    pub fn snapshot_interval(&self, is_local: bool, max_fps: u32) -> Duration {
        let viewing = *self.viewing_state.lock() == ViewingState::Viewing;
        match (is_local, viewing) {
            (true, true) => Duration::from_millis((1000 / max_fps.clamp(1, 5)) as u64),
            (true, false) => Duration::from_secs(1),
            (false, _) if self.config.is_pro => Duration::from_secs(5),
            (false, _) => Duration::from_secs(15),
        }
    }

    pub async fn upload_snapshot(&self, frame: &JpegFrame, is_local: bool, max_fps: u32) -> Result<()> {
        let interval = self.snapshot_interval(is_local, max_fps);
        let mut last_sent = self.last_snapshot_sent.lock();
        if last_sent.elapsed() < interval {
            return Ok(());
        }
        *last_sent = Instant::now();
        drop(last_sent);

        let sequence = self.snapshot_sequence.fetch_add(1, Ordering::Relaxed);
        let url = format!("{}/api/v1/octo/pic/", http_base(&self.config.server_url));
        self.http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.auth_token))
            .query(&[("seq", sequence.to_string())])
            .body(frame.data.to_vec())
            .send()
            .await
            .map_err(|e| ObicoError::ServerConnection(e.to_string()))?;
        Ok(())
    }

    async fn send_ws(&self, value: &Value) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let mut writer = self.ws_writer.lock().await;
        writer.send(Message::Text(payload)).await.map_err(|e| ObicoError::ServerConnection(e.to_string()))?;
        Ok(())
    }
}

fn http_base(server_url: &str) -> String {
    server_url.trim_end_matches('/').to_string()
}

fn ws_base(server_url: &str) -> String {
    http_base(server_url).replacen("https://", "wss://", 1).replacen("http://", "ws://", 1)
}

fn now_millis() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn spawn_read_pump(
    mut reader: futures::stream::SplitStream<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>>,
    events: mpsc::Sender<ObicoServerEvent>,
) {
    tokio::spawn(async move {
        while let Some(message) = reader.next().await {
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "obico server websocket error");
                    break;
                }
            };
            let Message::Text(text) = message else { continue };
            let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };

            let command = value.get("passthru").and_then(|v| serde_json::from_value::<PassthruCommand>(v.clone()).ok());
            if let Some(command) = command {
                let _ = events.send(ObicoServerEvent::Passthru(command)).await;
                continue;
            }

            match value.get("commands").and_then(Value::as_str) {
                Some("cancel") => {
                    let _ = events.send(ObicoServerEvent::CancelRequested).await;
                }
                Some("pause") => {
                    let _ = events.send(ObicoServerEvent::PauseRequested).await;
                }
                Some("resume") => {
                    let _ = events.send(ObicoServerEvent::ResumeRequested).await;
                }
                _ => {}
            }

            if let Some(viewing) = value.get("remote_status").and_then(|v| v.get("viewing")).and_then(Value::as_bool) {
                let state = if viewing { ViewingState::Viewing } else { ViewingState::Idle };
                let _ = events.send(ObicoServerEvent::ViewingStateChanged(state)).await;
            }
        }
        debug!("obico server read pump exiting");
    });
}

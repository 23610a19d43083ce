//! ObicoBridge (spec §4.8, component C7): optional per-printer Moonraker↔Obico
//! translation. Spawned by the worker once a decoder has produced extradata,
//! torn down alongside the rest of the streaming session.

pub mod janus;
pub mod moonraker;
pub mod rtp_streamer;
pub mod server_client;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ObicoStreamMode, PrinterConfig};
use crate::error::{ObicoError, Result};
use crate::events::{DaemonEvent, EventBus};
use crate::frame_hub::FrameHub;

use janus::JanusClient;
use moonraker::MoonrakerClient;
use rtp_streamer::{H264RtpStreamer, MjpegUdpStreamer};
use server_client::{ObicoServerClient, ObicoServerEvent, PassthruCommand};
use state::ObicoStateStore;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const RECONNECT_MAX_ATTEMPTS: u32 = 10;
const JANUS_STABILIZATION_DELAY: Duration = Duration::from_secs(2);
const MOONRAKER_HTTP_PORT: u16 = 7125;

pub struct ObicoBridgeHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ObicoBridgeHandle {
    pub fn spawn(printer: PrinterConfig, frame_hub: Arc<FrameHub>, event_bus: Arc<EventBus>, runtime_dir: impl Into<String>) -> Self {
        let cancel = CancellationToken::new();
        let runtime_dir = runtime_dir.into();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            run_bridge(printer, frame_hub, event_bus, runtime_dir, task_cancel).await;
        });
        Self { cancel, task }
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

async fn run_bridge(config: PrinterConfig, frame_hub: Arc<FrameHub>, event_bus: Arc<EventBus>, runtime_dir: String, cancel: CancellationToken) {
    let printer = config.name.clone();
    let state_store = ObicoStateStore::new(&printer, &runtime_dir);

    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return;
        }

        match run_session(&config, &frame_hub, &event_bus, &state_store, &cancel).await {
            Ok(()) => return,
            Err(e) => {
                attempts += 1;
                warn!(printer = %printer, attempt = attempts, error = %e, "obico bridge session ended");
                if attempts >= RECONNECT_MAX_ATTEMPTS {
                    event_bus.publish(DaemonEvent::ComponentError {
                        printer: printer.clone(),
                        component: "obico".to_string(),
                        message: format!("giving up after {attempts} attempts: {e}"),
                    });
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {},
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
}

async fn run_session(
    config: &PrinterConfig,
    frame_hub: &Arc<FrameHub>,
    event_bus: &Arc<EventBus>,
    state_store: &ObicoStateStore,
    cancel: &CancellationToken,
) -> Result<()> {
    let printer = config.name.clone();
    let obico = &config.obico;

    let moonraker = MoonrakerClient::connect(&printer, &config.ip, MOONRAKER_HTTP_PORT, Arc::clone(event_bus)).await?;
    reconcile_print_state(&moonraker, state_store).await;

    let (server_events_tx, mut server_events_rx) = mpsc::channel(32);
    let server = ObicoServerClient::connect(obico.clone(), server_events_tx).await?;

    tokio::time::sleep(JANUS_STABILIZATION_DELAY).await;
    let mut media = match &obico.janus_server {
        Some(url) => Some(start_media_relay(url, obico.stream_mode, &printer).await?),
        None => None,
    };

    let mut h264_subscription = frame_hub.subscribe_h264();
    let status_interval = tokio::time::interval(Duration::from_secs(5));
    tokio::pin!(status_interval);
    let mjpeg_relay_interval = tokio::time::interval(Duration::from_millis(200));
    tokio::pin!(mjpeg_relay_interval);

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),

            _ = status_interval.tick() => {
                let status = json!({ "printer": printer });
                if let Err(e) = server.push_status(status, false).await {
                    warn!(printer = %printer, error = %e, "obico status push failed");
                }
                if let Some(frame) = frame_hub.latest_jpeg() {
                    let _ = server.upload_snapshot(&frame, true, config.max_fps).await;
                }
            }

            event = server_events_rx.recv() => {
                match event {
                    Some(ObicoServerEvent::CancelRequested) => {
                        handle_cancel(&moonraker, event_bus, &printer).await;
                    }
                    Some(ObicoServerEvent::PauseRequested) => {
                        let _ = moonraker.pause_print().await;
                    }
                    Some(ObicoServerEvent::ResumeRequested) => {
                        let _ = moonraker.resume_print().await;
                    }
                    Some(ObicoServerEvent::Passthru(command)) => {
                        handle_passthru(&moonraker, &command).await;
                    }
                    Some(ObicoServerEvent::ViewingStateChanged(state)) => {
                        server.set_viewing_state(state);
                    }
                    None => break Err(ObicoError::ServerConnection("obico server event channel closed".to_string()).into()),
                }
            }

            packet = h264_subscription.recv(), if media.is_some() && obico.stream_mode == ObicoStreamMode::H264 => {
                if let Some(MediaRelay::H264 { streamer, .. }) = media.as_mut() {
                    if let Some(params) = frame_hub.parameter_sets() {
                        streamer.set_parameter_sets(params);
                    }
                    let _ = streamer.send_packet(&packet).await;
                }
            }

            _ = mjpeg_relay_interval.tick(), if media.is_some() && obico.stream_mode == ObicoStreamMode::Mjpeg => {
                if let Some(MediaRelay::Mjpeg { streamer, .. }) = media.as_mut() {
                    if let Some(frame) = frame_hub.latest_jpeg() {
                        let _ = streamer.send_frame(&frame).await;
                    }
                }
            }
        }
    };

    if let Some(relay) = media.take() {
        teardown_media_relay(relay).await;
    }
    outcome
}

enum MediaRelay {
    H264 { janus: JanusClient, mountpoint_id: u64, streamer: Box<H264RtpStreamer> },
    Mjpeg { janus: JanusClient, mountpoint_id: u64, streamer: Box<MjpegUdpStreamer> },
}

async fn start_media_relay(janus_server: &str, stream_mode: ObicoStreamMode, printer: &str) -> Result<MediaRelay> {
    let janus = JanusClient::connect(janus_server).await?;
    let video_port = pick_udp_port();
    let target: SocketAddr = format!("127.0.0.1:{video_port}").parse().map_err(|_| ObicoError::JanusFailed("invalid relay address".to_string()))?;

    match stream_mode {
        ObicoStreamMode::H264 => {
            let lease = janus.negotiate_rtp_mountpoint(printer, video_port).await?;
            let streamer = H264RtpStreamer::bind(target).await?;
            Ok(MediaRelay::H264 { janus, mountpoint_id: lease.mountpoint_id, streamer: Box::new(streamer) })
        }
        ObicoStreamMode::Mjpeg => {
            let lease = janus.negotiate_mjpeg_mountpoint(printer, video_port).await?;
            let streamer = MjpegUdpStreamer::bind(target).await?;
            Ok(MediaRelay::Mjpeg { janus, mountpoint_id: lease.mountpoint_id, streamer: Box::new(streamer) })
        }
    }
}

async fn teardown_media_relay(relay: MediaRelay) {
    match relay {
        MediaRelay::H264 { janus, mountpoint_id, .. } | MediaRelay::Mjpeg { janus, mountpoint_id, .. } => {
            let _ = janus.destroy_mountpoint(mountpoint_id).await;
        }
    }
}

fn pick_udp_port() -> u16 {
    use std::net::UdpSocket;
    UdpSocket::bind("0.0.0.0:0").and_then(|s| s.local_addr()).map(|a| a.port()).unwrap_or(0)
}

async fn handle_cancel(moonraker: &MoonrakerClient, event_bus: &Arc<EventBus>, printer: &str) {
    if let Err(e) = moonraker.cancel_print().await {
        warn!(printer = %printer, error = %e, "moonraker cancel failed");
    }
    // Native firmware must also stop, so the worker issues the MQTT stop
    // command regardless of whether Moonraker's cancel succeeded (spec §4.8).
    event_bus.publish(DaemonEvent::ObicoCancelRequested { printer: printer.to_string() });
}

async fn handle_passthru(moonraker: &MoonrakerClient, command: &PassthruCommand) {
    match command.func.as_str() {
        "moonraker_api" => {
            let path = command.target.as_deref().unwrap_or("/printer/info");
            if let Err(e) = moonraker.proxy_rest("GET", path, None).await {
                warn!(error = %e, "moonraker api passthru failed");
            }
        }
        other => {
            info!(func = other, "unhandled obico passthru command");
        }
    }
}

async fn reconcile_print_state(moonraker: &MoonrakerClient, state_store: &ObicoStateStore) {
    let Ok(objects) = moonraker.query_objects().await else { return };
    let filename = objects
        .get("print_stats")
        .and_then(|p| p.get("filename"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if filename.is_empty() {
        return;
    }
    let print_duration = objects.get("print_stats").and_then(|p| p.get("print_duration")).and_then(Value::as_f64).unwrap_or(0.0);
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let fallback_timestamp = now.saturating_sub(print_duration as u64);

    let _ = state_store.reconcile(filename, print_duration as u64, fallback_timestamp).await;
}

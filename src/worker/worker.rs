//! PrinterWorker (spec §4.5, component C5, "hardest subsystem"): the single
//! supervisory task per configured printer. Owns credential discovery,
//! MQTT/decoder/HTTP lifecycle, and the recovery/backoff protocol.
//!
//! The task-plus-cancellation-token shape and the "owns a stack of closers
//! invoked in reverse order on teardown" pattern (spec §9) are grounded on
//! `examples/retrontology-doorcam/src/capture.rs`'s `CaptureEventTask` /
//! `CancellationToken` usage, generalized from one-shot capture tasks to a
//! long-lived per-printer supervisor.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::PrinterConfig;
use crate::error::{AcproxycamError, Result};
use crate::events::{DaemonEvent, EventBus, LogThrottle};
use crate::frame_hub::FrameHub;
use crate::hls::HlsSegmenter;
use crate::mqtt::MqttController;
use crate::obico::ObicoBridgeHandle;
use crate::ssh::{LanModeService, SshCredentialService};
use crate::streaming::MjpegServerBuilder;

use super::decoder::{DecoderEvent, FfmpegDecoder};
use super::jpeg::encode_yuv420p;
use super::led_control::MqttLedControl;
use super::reachability::backoff_delay;
use super::status::{now_millis, LedStatus, WorkerState, WorkerStatus, WorkerStatusCell};

const GRACE_WINDOW: Duration = Duration::from_secs(5);
const STABILIZATION_WINDOW: Duration = Duration::from_secs(3);
const STALL_THRESHOLD: Duration = Duration::from_secs(10);
const QUICK_RECOVERY_WINDOW: Duration = Duration::from_secs(5 * 60);
const LED_POLL_INTERVAL: Duration = Duration::from_secs(30);
const LAN_MODE_RETRY_THROTTLE: Duration = Duration::from_secs(30);
const EXTERNAL_STOP_DELAY: Duration = Duration::from_millis(500);
const SUPERVISION_TICK: Duration = Duration::from_secs(1);
const OBICO_STATE_DIR: &str = "/var/lib/acproxycam";

enum WorkerControl {
    Pause,
    Resume,
    SetLed(bool, Option<u32>),
    Shutdown,
}

/// A handle the registry holds; the worker task itself runs detached.
pub struct PrinterWorkerHandle {
    pub name: String,
    pub status: Arc<WorkerStatusCell>,
    cancel: CancellationToken,
    control_tx: mpsc::Sender<WorkerControl>,
    task: JoinHandle<()>,
}

impl PrinterWorkerHandle {
    pub fn spawn(config: PrinterConfig, event_bus: Arc<EventBus>) -> Self {
        let name = config.name.clone();
        let status = Arc::new(WorkerStatusCell::new(WorkerStatus::initial(&name)));
        let cancel = CancellationToken::new();
        let (control_tx, control_rx) = mpsc::channel(8);

        let worker = PrinterWorker {
            config: Mutex::new(config),
            event_bus,
            status: Arc::clone(&status),
            cancel: cancel.clone(),
            control_rx: Mutex::new(control_rx),
            throttle: LogThrottle::new(Duration::from_secs(30)),
        };

        let task = tokio::spawn(async move { worker.run().await });

        Self { name, status, cancel, control_tx, task }
    }

    pub async fn pause(&self) {
        let _ = self.control_tx.send(WorkerControl::Pause).await;
    }

    pub async fn resume(&self) {
        let _ = self.control_tx.send(WorkerControl::Resume).await;
    }

    pub async fn set_led(&self, on: bool, brightness: Option<u32>) {
        let _ = self.control_tx.send(WorkerControl::SetLed(on, brightness)).await;
    }

    /// Cancels the task and waits (bounded) for it to tear down (spec §5
    /// "each worker awaits its subtasks up to a 5 s grace").
    pub async fn shutdown(self) {
        let _ = self.control_tx.send(WorkerControl::Shutdown).await;
        self.cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

struct PrinterWorker {
    config: Mutex<PrinterConfig>,
    event_bus: Arc<EventBus>,
    status: Arc<WorkerStatusCell>,
    cancel: CancellationToken,
    control_rx: Mutex<mpsc::Receiver<WorkerControl>>,
    throttle: Arc<LogThrottle>,
}

impl PrinterWorker {
    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.status.update(|s| s.state = WorkerState::Initializing);
            self.publish_state("initializing");

            match self.run_session().await {
                SessionOutcome::Cancelled => break,
                SessionOutcome::Paused => {
                    self.status.update(|s| {
                        s.state = WorkerState::Paused;
                        s.is_paused = true;
                    });
                    self.publish_state("paused");
                    if !self.wait_for_resume().await {
                        break;
                    }
                }
                SessionOutcome::Failed(err) => {
                    let ip = self.config.lock().await.ip.clone();
                    let ssh_port = self.config.lock().await.ssh_port;
                    self.status.update(|s| {
                        s.state = WorkerState::Retrying;
                        s.last_error = Some(err.to_string());
                        s.last_error_at_ms = Some(now_millis());
                    });
                    self.publish_state("retrying");

                    let delay = backoff_delay(&ip, ssh_port).await;
                    self.status.update(|s| s.next_retry_at_ms = Some(now_millis() + delay.as_millis()));
                    if !self.sleep_or_control(delay).await {
                        break;
                    }
                }
            }
        }

        self.status.update(|s| s.state = WorkerState::Stopped);
        self.publish_state("stopped");
    }

    /// Blocks in `Paused` until a `Resume` control message or cancellation.
    /// Returns `false` if the worker should stop entirely.
    async fn wait_for_resume(&self) -> bool {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                msg = self.control_rx.lock().await.recv() => match msg {
                    Some(WorkerControl::Resume) => {
                        self.status.update(|s| s.is_paused = false);
                        return true;
                    }
                    Some(WorkerControl::Shutdown) | None => return false,
                    _ => continue,
                }
            }
        }
    }

    /// Sleeps for `delay` unless cancelled or a pause/shutdown arrives in
    /// the meantime. Returns `false` if the worker should stop entirely.
    async fn sleep_or_control(&self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = self.cancel.cancelled() => return false,
                msg = self.control_rx.lock().await.recv() => match msg {
                    Some(WorkerControl::Shutdown) | None => return false,
                    Some(WorkerControl::Pause) => return true,
                    _ => continue,
                }
            }
        }
    }

    fn publish_state(&self, state: &str) {
        let printer = self.status.get().name;
        self.event_bus.publish(DaemonEvent::WorkerStateChanged { printer, state: state.to_string() });
    }

    /// Steps 1-11 of spec §4.5, as one session from credential discovery
    /// through to the point the session ends (cancelled, paused, or an
    /// unrecoverable failure that should fall back to the outer backoff loop).
    async fn run_session(&self) -> SessionOutcome {
        // Step 1: credential phase.
        if let Err(e) = self.credential_phase().await {
            return SessionOutcome::Failed(e);
        }

        self.status.update(|s| s.state = WorkerState::Connecting);
        self.publish_state("connecting");

        let config = self.config.lock().await.clone();

        // Step 2: LAN mode (optional), before first MQTT attempt.
        if config.auto_lan_mode {
            if let Err(e) = self.ensure_lan_mode(&config).await {
                warn!(printer = %config.name, error = %e, "lan mode open failed before mqtt connect");
            }
        }

        // Step 3: MQTT phase.
        let mqtt = match self.connect_mqtt(&config).await {
            Ok(mqtt) => mqtt,
            Err(e) if config.auto_lan_mode => {
                // "If MQTT connect then fails, call LAN mode once more and retry MQTT."
                if let Err(lan_err) = self.ensure_lan_mode(&config).await {
                    warn!(printer = %config.name, error = %lan_err, "lan mode retry failed");
                }
                match self.connect_mqtt(&config).await {
                    Ok(mqtt) => mqtt,
                    Err(e) => return SessionOutcome::Failed(e),
                }
            }
            Err(e) => return SessionOutcome::Failed(e),
        };
        let mqtt = Arc::new(mqtt);

        if !config.camera_enabled {
            // cameraEnabled=false: no MjpegServer/decoder/fan-out (spec §3 invariant).
            self.status.update(|s| s.state = WorkerState::Running);
            self.publish_state("running");
            return self.idle_session_loop(&config, mqtt).await;
        }

        // Step 4: streaming phase.
        self.streaming_session(&config, mqtt).await
    }

    async fn credential_phase(&self) -> Result<()> {
        let mut config = self.config.lock().await;
        let have_credentials = config.mqtt_username.is_some() && config.mqtt_password.is_some();

        if !have_credentials {
            let retrieved = SshCredentialService::retrieve_credentials(&config.ip, config.ssh_port, &config.ssh_username, &config.ssh_password).await?;
            config.mqtt_username = retrieved.mqtt_username;
            config.mqtt_password = retrieved.mqtt_password;
            config.device_id = retrieved.device_id;
            config.model_code = retrieved.model_code;
            config.device_type = retrieved.device_type;
            self.event_bus.publish(DaemonEvent::ConfigChanged { printer: config.name.clone() });
            return Ok(());
        }

        let info = SshCredentialService::retrieve_printer_info(&config.ip, config.ssh_port, &config.ssh_username, &config.ssh_password).await?;
        if info.device_id.is_some() && info.device_id != config.device_id {
            // Printer was swapped or factory-reset: wipe cached identity and
            // re-run full credential discovery.
            config.mqtt_username = None;
            config.mqtt_password = None;
            config.model_code = None;
            config.device_type = None;
            config.device_id = None;

            let retrieved = SshCredentialService::retrieve_credentials(&config.ip, config.ssh_port, &config.ssh_username, &config.ssh_password).await?;
            config.mqtt_username = retrieved.mqtt_username;
            config.mqtt_password = retrieved.mqtt_password;
            config.device_id = retrieved.device_id;
            config.model_code = retrieved.model_code;
            config.device_type = retrieved.device_type;
            self.event_bus.publish(DaemonEvent::ConfigChanged { printer: config.name.clone() });
        }

        Ok(())
    }

    async fn ensure_lan_mode(&self, config: &PrinterConfig) -> Result<()> {
        let result = LanModeService::ensure_open(&config.ip, config.ssh_port, &config.ssh_username, &config.ssh_password).await?;
        if !result.success {
            if let Some(err) = result.error {
                return Err(AcproxycamError::system(format!("lan mode open failed: {err}")));
            }
        }
        Ok(())
    }

    async fn connect_mqtt(&self, config: &PrinterConfig) -> Result<MqttController> {
        let username = config.mqtt_username.clone().unwrap_or_default();
        let password = config.mqtt_password.clone().unwrap_or_default();
        let device_id = config.device_id.clone().unwrap_or_default();

        self.status.update(|s| s.mqtt.last_attempt_at_ms = Some(now_millis()));

        let controller =
            MqttController::connect(config.name.clone(), device_id, &config.ip, config.mqtt_port, &username, &password, Arc::clone(&self.event_bus))
                .await?;
        controller.subscribe_all().await?;

        let model_code = match &config.model_code {
            Some(code) => code.clone(),
            None => controller.wait_for_model_detection(Duration::from_secs(10)).await?,
        };

        controller.try_start_camera(&model_code).await?;
        self.status.update(|s| {
            s.mqtt.connected = true;
            s.mqtt.model_code = Some(model_code.clone());
            s.mqtt.camera_started = true;
        });
        Ok(controller)
    }

    /// `cameraEnabled = false`: MQTT-only session, no streaming surface.
    async fn idle_session_loop(&self, _config: &PrinterConfig, mqtt: Arc<MqttController>) -> SessionOutcome {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = mqtt.disconnect().await;
                    self.status.update(|s| s.mqtt.connected = false);
                    return SessionOutcome::Cancelled;
                }
                msg = self.control_rx.lock().await.recv() => match msg {
                    Some(WorkerControl::Pause) => {
                        let _ = mqtt.disconnect().await;
                        self.status.update(|s| s.mqtt.connected = false);
                        return SessionOutcome::Paused;
                    }
                    Some(WorkerControl::Shutdown) | None => {
                        let _ = mqtt.disconnect().await;
                        self.status.update(|s| s.mqtt.connected = false);
                        return SessionOutcome::Cancelled;
                    }
                    _ => continue,
                }
                _ = tokio::time::sleep(SUPERVISION_TICK) => continue,
            }
        }
    }

    async fn streaming_session(&self, config: &PrinterConfig, mqtt: Arc<MqttController>) -> SessionOutcome {
        let frame_hub = Arc::new(FrameHub::new(config.name.clone(), Arc::clone(&self.event_bus)));
        let hls = Arc::new(HlsSegmenter::new(
            config.name.clone(),
            2_000,
            config.hls_part_duration_ms as u32,
            config.ll_hls_enabled,
        ));

        let led = Arc::new(MqttLedControl { controller: Arc::clone(&mqtt) });
        let bind_addr: SocketAddr = match format!("0.0.0.0:{}", config.mjpeg_port).parse() {
            Ok(addr) => addr,
            Err(e) => return SessionOutcome::Failed(AcproxycamError::system(format!("invalid mjpeg bind address: {e}"))),
        };

        let server = match MjpegServerBuilder::new()
            .printer(config.name.clone())
            .bind_addr(bind_addr)
            .frame_hub(Arc::clone(&frame_hub))
            .hls(Arc::clone(&hls))
            .event_bus(Arc::clone(&self.event_bus))
            .led(led)
            .max_fps(config.max_fps)
            .idle_fps(config.idle_fps)
            .build()
        {
            Ok(server) => server,
            Err(e) => return SessionOutcome::Failed(e),
        };
        let mjpeg_status = server.status_cell();
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!(error = %e, "mjpeg server exited");
            }
        });

        let flv_url = format!("http://{}:18088/flv", config.ip);
        let mut decoder = match FfmpegDecoder::start(&flv_url) {
            Ok(handle) => handle,
            Err(e) => return SessionOutcome::Failed(e),
        };

        self.status.update(|s| s.stream.connected = true);

        let mut event_rx = self.event_bus.subscribe();
        let decoder_started_at = Instant::now();
        let mut stabilized_at: Option<Instant> = None;
        let mut last_frame_at = Instant::now();
        let mut stream_failed_at: Option<Instant> = None;
        let mut last_lan_mode_retry: Option<Instant> = None;
        let mut last_led_poll = Instant::now();
        let mut led_on_since: Option<Instant> = None;
        let mut last_keepalive = Instant::now();
        let decoded_frame_count = Arc::new(AtomicU64::new(0));
        let mut yuv_decode_started = false;
        let mut obico: Option<ObicoBridgeHandle> = None;

        let mut supervision = tokio::time::interval(SUPERVISION_TICK);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    decoder.stop().await;
                    let _ = mqtt.disconnect().await;
                    self.status.update(|s| s.mqtt.connected = false);
                    mjpeg_status.update(|s| s.state = "stopped".to_string());
                    if let Some(bridge) = obico.take() { bridge.shutdown().await; }
                    return SessionOutcome::Cancelled;
                }

                control = self.control_rx.lock().await.recv() => match control {
                    Some(WorkerControl::Pause) => {
                        decoder.stop().await;
                        let _ = mqtt.disconnect().await;
                        self.status.update(|s| s.mqtt.connected = false);
                        mjpeg_status.update(|s| s.state = "paused".to_string());
                        if let Some(bridge) = obico.take() { bridge.shutdown().await; }
                        return SessionOutcome::Paused;
                    }
                    Some(WorkerControl::Shutdown) | None => {
                        if config.send_stop_command {
                            if let Some(model_code) = &config.model_code {
                                let _ = mqtt.try_stop_camera(model_code).await;
                            }
                        }
                        decoder.stop().await;
                        let _ = mqtt.disconnect().await;
                        self.status.update(|s| s.mqtt.connected = false);
                        mjpeg_status.update(|s| s.state = "stopped".to_string());
                        if let Some(bridge) = obico.take() { bridge.shutdown().await; }
                        return SessionOutcome::Cancelled;
                    }
                    Some(WorkerControl::SetLed(on, brightness)) => {
                        let _ = mqtt.set_led(on, brightness).await;
                        led_on_since = if on { Some(Instant::now()) } else { None };
                    }
                    _ => {}
                },

                event = event_rx.recv() => {
                    if let Ok(event) = event {
                        if event.printer() == Some(config.name.as_str()) {
                            match event {
                                DaemonEvent::CameraStopDetected { .. } => {
                                    self.status.update(|s| s.mqtt.camera_started = false);
                                    // Step 7: external stop handling.
                                    tokio::time::sleep(EXTERNAL_STOP_DELAY).await;
                                    if let Some(model_code) = &config.model_code {
                                        if mqtt.try_start_camera(model_code).await.is_ok() {
                                            self.status.update(|s| s.mqtt.camera_started = true);
                                        }
                                    }
                                }
                                DaemonEvent::ModelCodeDetected { model_code, .. } => {
                                    self.status.update(|s| s.mqtt.model_code = Some(model_code.clone()));
                                    mjpeg_status.update(|s| s.model_code = Some(model_code));
                                }
                                DaemonEvent::LedStatusReceived { on, brightness, .. } => {
                                    self.status.update(|s| s.led = Some(LedStatus { on, brightness }));
                                }
                                DaemonEvent::PrinterStateReceived { state, .. } => {
                                    self.status.update(|s| s.mqtt.printer_state = Some(state));
                                }
                                _ => {}
                            }
                        }
                    }
                }

                decoder_event = decoder.events.recv() => match decoder_event {
                    Some(DecoderEvent::Started { width, height, params }) => {
                        frame_hub.set_parameter_sets(params.clone());
                        hls.set_parameter_sets(params, width, height);
                        self.status.update(|s| {
                            s.stream.current_width = Some(width);
                            s.stream.current_height = Some(height);
                        });
                        if width > 0 && height > 0 && !yuv_decode_started {
                            yuv_decode_started = true;
                            if let Err(e) = FfmpegDecoder::start_yuv(&mut decoder, &flv_url, width, height) {
                                warn!(printer = %config.name, error = %e, "failed to start yuv decode");
                            }
                        }
                        if config.obico.enabled && obico.is_none() {
                            obico = Some(ObicoBridgeHandle::spawn(config.clone(), Arc::clone(&frame_hub), Arc::clone(&self.event_bus), OBICO_STATE_DIR));
                        }
                    }
                    Some(DecoderEvent::H264Packet(packet)) => {
                        last_frame_at = Instant::now();
                        decoded_frame_count.fetch_add(1, Ordering::Relaxed);
                        frame_hub.publish_h264(packet.clone());
                        hls.push_packet(packet);
                    }
                    Some(DecoderEvent::YuvFrame(frame)) => {
                        last_frame_at = Instant::now();
                        let quality = config.jpeg_quality;
                        if let Ok(jpeg) = encode_yuv420p(&frame, quality) {
                            frame_hub.publish_jpeg(jpeg);
                        }
                        frame_hub.publish_yuv(frame);
                    }
                    Some(DecoderEvent::Error(message)) => {
                        if self.throttle.should_emit("decoder", &message) {
                            warn!(printer = %config.name, %message, "decoder error");
                        }
                    }
                    Some(DecoderEvent::Stopped) | None => {
                        // handled by stall detection below via last_frame_at
                    }
                },

                _ = supervision.tick() => {
                    // Step 5: supervision loop, evaluated every second.
                    frame_hub.reap_closed_subscribers();

                    if decoder_started_at.elapsed() < GRACE_WINDOW {
                        continue;
                    }

                    let frames_fresh = last_frame_at.elapsed() < STALL_THRESHOLD;

                    if frames_fresh {
                        stream_failed_at = None;
                        if stabilized_at.is_none() {
                            stabilized_at = Some(Instant::now());
                        }
                        let stabilized = stabilized_at.map(|t| t.elapsed() >= STABILIZATION_WINDOW).unwrap_or(false);

                        self.status.update(|s| {
                            s.last_seen_online_ms = Some(now_millis());
                            s.stream.decoded_frame_count = decoded_frame_count.load(Ordering::Relaxed);
                        });
                        mjpeg_status.update(|s| s.last_frame_at_ms = Some(now_millis()));

                        if stabilized {
                            let was_running = self.status.get().state == WorkerState::Running;
                            self.status.update(|s| s.state = WorkerState::Running);
                            if !was_running {
                                self.throttle.reset_component("decoder");
                                self.publish_state("running");
                                mjpeg_status.update(|s| {
                                    s.state = "running".to_string();
                                    s.consecutive_failures = 0;
                                });
                            }

                            if last_led_poll.elapsed() >= LED_POLL_INTERVAL {
                                last_led_poll = Instant::now();
                                self.led_auto_control(config, &mqtt, &mut led_on_since).await;
                            }

                            // Re-issue the camera-start command periodically while a
                            // consumer is attached, since some models silently stop
                            // streaming if never reminded (spec §4.5 step 5 healthy path).
                            let keepalive = Duration::from_secs(config.camera_keepalive_seconds);
                            if !keepalive.is_zero() && last_keepalive.elapsed() >= keepalive && frame_hub.subscriber_count() > 0 {
                                last_keepalive = Instant::now();
                                if let Some(model_code) = &config.model_code {
                                    let _ = mqtt.try_start_camera(model_code).await;
                                }
                            }
                        }
                        continue;
                    }

                    // Unhealthy path.
                    let failed_since = *stream_failed_at.get_or_insert_with(Instant::now);
                    let failure_duration = failed_since.elapsed();

                    if failure_duration >= QUICK_RECOVERY_WINDOW {
                        let reachable = super::reachability::is_reachable(&config.ip, config.ssh_port).await;
                        if reachable {
                            // keep retrying the quick-recovery path
                        } else {
                            decoder.stop().await;
                            let _ = mqtt.disconnect().await;
                            self.status.update(|s| s.mqtt.connected = false);
                            mjpeg_status.update(|s| s.state = "stopped".to_string());
                            if let Some(bridge) = obico.take() { bridge.shutdown().await; }
                            return SessionOutcome::Failed(AcproxycamError::system("stream unresponsive and printer unreachable"));
                        }
                    }

                    if config.auto_lan_mode && failure_duration >= LAN_MODE_RETRY_THROTTLE {
                        let should_retry = last_lan_mode_retry.map(|t| t.elapsed() >= LAN_MODE_RETRY_THROTTLE).unwrap_or(true);
                        if should_retry {
                            last_lan_mode_retry = Some(Instant::now());
                            if let Err(e) = self.ensure_lan_mode(config).await {
                                warn!(printer = %config.name, error = %e, "lan mode retry during recovery failed");
                            }
                        }
                    }

                    self.status.update(|s| s.state = WorkerState::Retrying);
                    mjpeg_status.update(|s| {
                        s.state = "retrying".to_string();
                        s.consecutive_failures += 1;
                    });
                    if let Some(model_code) = &config.model_code {
                        let _ = mqtt.try_start_camera(model_code).await;
                    }
                    decoder.stop().await;
                    decoder = match FfmpegDecoder::start(&flv_url) {
                        Ok(handle) => handle,
                        Err(e) => return SessionOutcome::Failed(e),
                    };
                    yuv_decode_started = false;
                    stabilized_at = None;
                    tokio::time::sleep(Duration::from_millis(3_500)).await;
                }
            }
        }
    }

    async fn led_auto_control(&self, config: &PrinterConfig, mqtt: &MqttController, led_on_since: &mut Option<Instant>) {
        if !config.led_auto_control {
            return;
        }

        let printer_state = self.status.get().mqtt.printer_state.unwrap_or_default();
        let idle = matches!(printer_state.as_str(), "free" | "standby" | "ready");

        if !idle {
            if mqtt.set_led(true, None).await.is_ok() {
                *led_on_since = Some(Instant::now());
            }
            return;
        }

        let timeout = Duration::from_secs(config.standby_led_timeout_minutes as u64 * 60);
        if let Some(since) = led_on_since {
            if since.elapsed() >= timeout {
                let _ = mqtt.set_led(false, None).await;
                *led_on_since = None;
            }
        }
    }
}

enum SessionOutcome {
    Cancelled,
    Paused,
    Failed(AcproxycamError),
}

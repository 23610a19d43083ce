//! MqttController (spec §4.3, component C3): connects to the printer's MQTT
//! broker, subscribes the device topic tree, correlates request/response
//! operations by request id, and raises ack-less observations (model code,
//! LED status, printer state, external camera stop) as [`DaemonEvent`]s.
//!
//! Connection and event-loop-pump shape is grounded on `rumqttc`'s standard
//! `AsyncClient`/`EventLoop` split (the crate itself, per kmay89-securaCV's
//! manifest); the pending-request correlation map keyed by request id and
//! resolved from the eventloop-pump task is the same structural pattern as
//! mpapierski-bambu-rs's `mqtt.rs`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, Packet, QoS};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{MqttError, Result};
use crate::events::{DaemonEvent, EventBus};

use super::commands::{camera_command, led_command, parse_inbound, print_stop_command, CameraOp, InboundMessage, LedOp};
use super::topics::{ack_topic, command_topic, state_topic, wildcard_subscription};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

struct PendingRequest {
    reply: oneshot::Sender<InboundMessage>,
}

pub struct MqttController {
    printer: String,
    device_id: Mutex<String>,
    model_code: Arc<Mutex<Option<String>>>,
    client: AsyncClient,
    connected: Mutex<bool>,
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
    event_bus: Arc<EventBus>,
    last_known_camera_started: Mutex<bool>,
}

impl MqttController {
    pub async fn connect(
        printer: impl Into<String>,
        device_id: impl Into<String>,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let printer = printer.into();
        let device_id = device_id.into();

        let mut options = MqttOptions::new(format!("acproxycam-{printer}"), host.to_string(), port);
        options.set_credentials(username.to_string(), password.to_string());
        options.set_keep_alive(Duration::from_secs(30));

        let (client, eventloop) = AsyncClient::new(options, 32);

        let pending: Arc<Mutex<HashMap<String, PendingRequest>>> = Arc::new(Mutex::new(HashMap::new()));
        let model_code: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let controller = Self {
            printer: printer.clone(),
            device_id: Mutex::new(device_id.clone()),
            model_code: Arc::clone(&model_code),
            client,
            connected: Mutex::new(false),
            pending: Arc::clone(&pending),
            event_bus: Arc::clone(&event_bus),
            last_known_camera_started: Mutex::new(false),
        };

        spawn_eventloop_pump(eventloop, printer, device_id, pending, event_bus, model_code);

        Ok(controller)
    }

    pub async fn subscribe_all(&self) -> Result<()> {
        let topic = wildcard_subscription(&self.device_id.lock());
        self.client.subscribe(&topic, QoS::AtLeastOnce).await.map_err(|e| MqttError::Transport(e.to_string()))?;
        *self.connected.lock() = true;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await.map_err(|e| MqttError::Transport(e.to_string()))?;
        *self.connected.lock() = false;
        Ok(())
    }

    pub async fn wait_for_model_detection(&self, deadline: Duration) -> Result<String> {
        if let Some(code) = self.model_code.lock().clone() {
            return Ok(code);
        }
        let mut rx = self.event_bus.subscribe();
        let printer = self.printer.clone();
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(DaemonEvent::ModelCodeDetected { printer: p, model_code }) if p == printer => return model_code,
                    Ok(_) => continue,
                    Err(_) => continue,
                }
            }
        };
        timeout(deadline, wait).await.map_err(|_| MqttError::ModelDetectTimeout(deadline).into())
    }

    pub async fn try_start_camera(&self, model_code: &str) -> Result<()> {
        self.send_camera_command(CameraOp::Start, model_code).await
    }

    pub async fn try_stop_camera(&self, model_code: &str) -> Result<()> {
        self.send_camera_command(CameraOp::Stop, model_code).await
    }

    async fn send_camera_command(&self, op: CameraOp, model_code: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected.into());
        }
        let device_id = self.device_id.lock().clone();
        let (request_id, payload) = camera_command(op, &device_id, model_code);
        self.await_correlated_reply(request_id, payload, DEFAULT_REQUEST_TIMEOUT).await?;
        *self.last_known_camera_started.lock() = matches!(op, CameraOp::Start);
        Ok(())
    }

    pub async fn query_led_status(&self) -> Result<(bool, Option<u32>)> {
        let device_id = self.device_id.lock().clone();
        let (request_id, payload) = led_command(LedOp::Get, &device_id, None, None);
        let reply = self.await_correlated_reply(request_id, payload, DEFAULT_REQUEST_TIMEOUT).await?;
        Ok((reply.led_on.unwrap_or(false), reply.led_brightness))
    }

    pub async fn set_led(&self, on: bool, brightness: Option<u32>) -> Result<()> {
        let device_id = self.device_id.lock().clone();
        let (request_id, payload) = led_command(LedOp::Set, &device_id, Some(on), brightness);
        self.await_correlated_reply(request_id, payload, DEFAULT_REQUEST_TIMEOUT).await?;
        Ok(())
    }

    pub async fn send_print_stop(&self) -> Result<()> {
        let device_id = self.device_id.lock().clone();
        let (request_id, payload) = print_stop_command(&device_id);
        self.await_correlated_reply(request_id, payload, DEFAULT_REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn await_correlated_reply(&self, request_id: String, payload: String, request_timeout: Duration) -> Result<InboundMessage> {
        if self.pending.lock().contains_key(&request_id) {
            return Err(MqttError::RequestInFlight { key: request_id }.into());
        }
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), PendingRequest { reply: tx });

        let device_id = self.device_id.lock().clone();
        let topic = command_topic(&device_id);
        if let Err(e) = self.client.publish(&topic, QoS::AtLeastOnce, false, payload.into_bytes()).await {
            self.pending.lock().remove(&request_id);
            return Err(MqttError::Transport(e.to_string()).into());
        }

        match timeout(request_timeout, rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => {
                self.pending.lock().remove(&request_id);
                Err(MqttError::Transport("reply channel dropped".into()).into())
            }
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(MqttError::RequestTimeout { key: request_id, timeout: request_timeout }.into())
            }
        }
    }
}

fn spawn_eventloop_pump(
    mut eventloop: rumqttc::EventLoop,
    printer: String,
    device_id: String,
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
    event_bus: Arc<EventBus>,
    model_code_slot: Arc<Mutex<Option<String>>>,
) {
    tokio::spawn(async move {
        let mut camera_believed_started = false;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let Some(msg) = parse_inbound(&publish.payload) else { continue };

                    if let Some(code) = msg.model_code.clone() {
                        *model_code_slot.lock() = Some(code.clone());
                        event_bus.publish(DaemonEvent::ModelCodeDetected { printer: printer.clone(), model_code: code });
                    }
                    if let Some(on) = msg.led_on {
                        event_bus.publish(DaemonEvent::LedStatusReceived { printer: printer.clone(), on, brightness: msg.led_brightness });
                    }
                    if let Some(state) = msg.printer_state.clone() {
                        event_bus.publish(DaemonEvent::PrinterStateReceived { printer: printer.clone(), state });
                    }
                    if let Some(state) = msg.camera_state.as_deref() {
                        if state == "stopped" && camera_believed_started {
                            camera_believed_started = false;
                            event_bus.publish(DaemonEvent::CameraStopDetected { printer: printer.clone() });
                        } else if state == "started" {
                            camera_believed_started = true;
                        }
                    }

                    if let Some(request_id) = msg.request_id.clone() {
                        if let Some(pending_request) = pending.lock().remove(&request_id) {
                            let _ = pending_request.reply.send(msg);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(printer = %printer, device_id = %device_id, error = %e, "mqtt eventloop error");
                    event_bus.publish(DaemonEvent::ComponentError {
                        printer: printer.clone(),
                        component: "mqtt".to_string(),
                        message: e.to_string(),
                    });
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::super::commands::parse_inbound;

    #[test]
    fn external_stop_payload_is_recognized_by_shape() {
        let msg = parse_inbound(br#"{"camera_state":"stopped"}"#).unwrap();
        assert_eq!(msg.camera_state.as_deref(), Some("stopped"));
    }
}

//! MoonrakerClient (spec §4.8): REST + JSON-RPC-over-WebSocket client to the
//! modified-firmware printer's Moonraker instance.
//!
//! The JSON-RPC request/response correlation (atomic request-id counter,
//! pending-oneshot map resolved from a background pump task) is the same
//! shape as `MqttController`'s ack correlation in `mqtt/controller.rs`,
//! carried over to a WebSocket transport via `tokio-tungstenite`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::{ObicoError, Result};
use crate::events::{DaemonEvent, EventBus};

const SUBSCRIBE_OBJECTS: &[&str] = &["webhooks", "print_stats", "virtual_sdcard", "gcode_move", "toolhead", "extruder", "heater_bed", "display_status"];
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

struct PendingRpc {
    reply: oneshot::Sender<Value>,
}

pub struct MoonrakerClient {
    printer: String,
    http: HttpClient,
    http_base: String,
    ws_writer: tokio::sync::Mutex<futures::stream::SplitSink<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, Message>>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, PendingRpc>>>,
}

impl MoonrakerClient {
    pub async fn connect(printer: impl Into<String>, host: &str, http_port: u16, event_bus: Arc<EventBus>) -> Result<Self> {
        let printer = printer.into();
        let http_base = format!("http://{host}:{http_port}");
        let ws_url = format!("ws://{host}:{http_port}/websocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| ObicoError::MoonrakerConnection(e.to_string()))?;
        let (ws_writer, ws_reader) = ws_stream.split();

        let pending: Arc<Mutex<HashMap<u64, PendingRpc>>> = Arc::new(Mutex::new(HashMap::new()));
        spawn_read_pump(ws_reader, printer.clone(), Arc::clone(&pending), event_bus);

        let client = Self {
            printer,
            http: HttpClient::new(),
            http_base,
            ws_writer: tokio::sync::Mutex::new(ws_writer),
            next_id: AtomicU64::new(1),
            pending,
        };

        client.subscribe_objects().await?;
        Ok(client)
    }

    async fn subscribe_objects(&self) -> Result<()> {
        let objects: HashMap<&str, Value> = SUBSCRIBE_OBJECTS.iter().map(|&name| (name, Value::Null)).collect();
        self.rpc_call("printer.objects.subscribe", json!({ "objects": objects })).await?;
        Ok(())
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingRpc { reply: tx });

        let request = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": id });
        let payload = serde_json::to_string(&request)?;

        {
            let mut writer = self.ws_writer.lock().await;
            writer.send(Message::Text(payload)).await.map_err(|e| ObicoError::MoonrakerConnection(e.to_string()))?;
        }

        match timeout(RPC_TIMEOUT, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ObicoError::MoonrakerConnection("rpc channel closed".to_string()).into()),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(ObicoError::RequestTimeout(method.to_string()).into())
            }
        }
    }

    /// Queries `printer.objects.query` once, used on (re)connect to seed the
    /// current print state before incremental `notify_status_update`s arrive.
    pub async fn query_objects(&self) -> Result<Value> {
        let objects: HashMap<&str, Value> = SUBSCRIBE_OBJECTS.iter().map(|&name| (name, Value::Null)).collect();
        self.rpc_call("printer.objects.query", json!({ "objects": objects })).await
    }

    pub async fn job_history(&self, limit: u32) -> Result<Value> {
        let url = format!("{}/server/history/list?limit={limit}&order=desc", self.http_base);
        let response = self.http.get(&url).send().await.map_err(|e| ObicoError::MoonrakerConnection(e.to_string()))?;
        response.json::<Value>().await.map_err(|e| ObicoError::MoonrakerConnection(e.to_string()).into())
    }

    pub async fn cancel_print(&self) -> Result<()> {
        self.rpc_call("printer.print.cancel", json!({})).await?;
        Ok(())
    }

    pub async fn pause_print(&self) -> Result<()> {
        self.rpc_call("printer.print.pause", json!({})).await?;
        Ok(())
    }

    pub async fn resume_print(&self) -> Result<()> {
        self.rpc_call("printer.print.resume", json!({})).await?;
        Ok(())
    }

    /// Proxies an arbitrary Moonraker REST request for Obico's "Moonraker API
    /// proxy" passthru command (spec §4.8).
    pub async fn proxy_rest(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{path}", self.http_base);
        let request = match method.to_uppercase().as_str() {
            "POST" => self.http.post(&url),
            "DELETE" => self.http.delete(&url),
            _ => self.http.get(&url),
        };
        let request = match body {
            Some(body) => request.json(&body),
            None => request,
        };
        let response = request.send().await.map_err(|e| ObicoError::MoonrakerConnection(e.to_string()))?;
        response.json::<Value>().await.map_err(|e| ObicoError::MoonrakerConnection(e.to_string()).into())
    }

    pub fn printer(&self) -> &str {
        &self.printer
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

fn spawn_read_pump(
    mut reader: futures::stream::SplitStream<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>>,
    printer: String,
    pending: Arc<Mutex<HashMap<u64, PendingRpc>>>,
    event_bus: Arc<EventBus>,
) {
    tokio::spawn(async move {
        while let Some(message) = reader.next().await {
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    warn!(printer = %printer, error = %e, "moonraker websocket error");
                    break;
                }
            };
            let Message::Text(text) = message else { continue };
            let Ok(envelope) = serde_json::from_str::<RpcEnvelope>(&text) else { continue };

            if let Some(id) = envelope.id {
                if let Some(PendingRpc { reply }) = pending.lock().remove(&id) {
                    let _ = reply.send(envelope.result.unwrap_or(Value::Null));
                    continue;
                }
            }

            if envelope.method.as_deref() == Some("notify_status_update") {
                debug!(printer = %printer, "moonraker status update");
                event_bus.publish(DaemonEvent::PrinterStateReceived {
                    printer: printer.clone(),
                    state: envelope.params.map(|p| p.to_string()).unwrap_or_default(),
                });
            } else if envelope.method.as_deref() == Some("notify_klippy_disconnected") {
                warn!(printer = %printer, "moonraker reported klippy disconnected");
            }
        }
        debug!(printer = %printer, "moonraker read pump exiting");
    });
}

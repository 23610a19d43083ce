//! IpcServer (spec §4.9, component C8): a Unix domain stream socket at a
//! configurable path. Each accepted connection reads one line of JSON
//! (`{command, data}`), writes one line of JSON response
//! (`{ok, data|error}`), and closes (spec §6).

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DaemonConfig, PrinterConfig};
use crate::error::{IpcError, Result};
use crate::events::{DaemonEvent, EventBus};
use crate::registry::PrinterRegistry;

#[derive(Debug, Deserialize)]
struct Request {
    command: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Response {
    fn ok(data: impl Serialize) -> Self {
        Self { ok: true, data: serde_json::to_value(data).ok(), error: None }
    }

    fn ok_empty() -> Self {
        Self { ok: true, data: None, error: None }
    }

    fn err(message: impl std::fmt::Display) -> Self {
        Self { ok: false, data: None, error: Some(message.to_string()) }
    }
}

pub struct IpcServer {
    socket_path: String,
    registry: Arc<PrinterRegistry>,
    event_bus: Arc<EventBus>,
    started_at: Instant,
}

impl IpcServer {
    pub fn new(socket_path: impl Into<String>, registry: Arc<PrinterRegistry>, event_bus: Arc<EventBus>) -> Self {
        Self { socket_path: socket_path.into(), registry, event_bus, started_at: Instant::now() }
    }

    /// Binds the socket and serves connections until `cancel` fires.
    pub async fn serve(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let _ = std::fs::remove_file(&self.socket_path);
        if let Some(parent) = std::path::Path::new(&self.socket_path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| IpcError::BindFailed(e.to_string()))?;
        info!(path = %self.socket_path, "ipc server listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    warn!(error = %e, "ipc connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "ipc accept failed");
                        }
                    }
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }

    async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let bytes = reader.read_line(&mut line).await.map_err(|e| IpcError::MalformedRequest(e.to_string()))?;
        if bytes == 0 {
            return Ok(());
        }

        let response = match serde_json::from_str::<Request>(line.trim_end()) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => Response::err(IpcError::MalformedRequest(e.to_string())),
        };

        let mut out = serde_json::to_string(&response).unwrap_or_else(|_| "{\"ok\":false,\"error\":\"encode failure\"}".to_string());
        out.push('\n');
        writer.write_all(out.as_bytes()).await.map_err(|e| IpcError::MalformedRequest(e.to_string()))?;
        Ok(())
    }

    async fn dispatch(&self, request: Request) -> Response {
        match request.command.as_str() {
            "GetStatus" => self.get_status(),
            "ListPrinters" => Response::ok(self.registry.list_statuses()),
            "GetPrinterDetails" => match parse_name(&request.data) {
                Ok(name) => match self.registry.printer_status(&name) {
                    Ok(status) => Response::ok(status),
                    Err(e) => Response::err(e),
                },
                Err(e) => Response::err(e),
            },
            "GetPrinterConfig" => match parse_name(&request.data) {
                Ok(name) => match self.registry.printer_config(&name) {
                    Ok(config) => Response::ok(config),
                    Err(e) => Response::err(e),
                },
                Err(e) => Response::err(e),
            },
            "AddPrinter" => match serde_json::from_value::<PrinterConfig>(request.data) {
                Ok(config) => match self.registry.add_printer(config).await {
                    Ok(()) => Response::ok_empty(),
                    Err(e) => Response::err(e),
                },
                Err(e) => Response::err(IpcError::MalformedRequest(e.to_string())),
            },
            "DeletePrinter" => match parse_name(&request.data) {
                Ok(name) => match self.registry.delete_printer(&name).await {
                    Ok(()) => Response::ok_empty(),
                    Err(e) => Response::err(e),
                },
                Err(e) => Response::err(e),
            },
            "ModifyPrinter" => self.modify_printer(request.data).await,
            "PausePrinter" => match parse_name(&request.data) {
                Ok(name) => match self.registry.pause_printer(&name).await {
                    Ok(()) => Response::ok_empty(),
                    Err(e) => Response::err(e),
                },
                Err(e) => Response::err(e),
            },
            "ResumePrinter" => match parse_name(&request.data) {
                Ok(name) => match self.registry.resume_printer(&name).await {
                    Ok(()) => Response::ok_empty(),
                    Err(e) => Response::err(e),
                },
                Err(e) => Response::err(e),
            },
            "GetLedStatus" => match parse_name(&request.data) {
                Ok(name) => match self.registry.printer_status(&name) {
                    Ok(status) => {
                        let led = status.led.unwrap_or(crate::worker::status::LedStatus { on: false, brightness: None });
                        Response::ok(serde_json::json!({"type": "led", "isOn": led.on, "brightness": led.brightness}))
                    }
                    Err(e) => Response::err(e),
                },
                Err(e) => Response::err(e),
            },
            "SetLed" => self.set_led(request.data).await,
            "ReloadConfig" => match DaemonConfig::load_from_file(self.registry.config_path()) {
                Ok(config) => match self.registry.reload_config(config).await {
                    Ok(()) => Response::ok_empty(),
                    Err(e) => Response::err(e),
                },
                Err(e) => Response::err(e),
            },
            "ChangeInterfaces" => self.change_interfaces(request.data).await,
            "StopService" => {
                self.event_bus.publish(DaemonEvent::ShutdownRequested { reason: "ipc StopService".to_string() });
                Response::ok_empty()
            }
            other => Response::err(IpcError::UnknownCommand(other.to_string())),
        }
    }

    fn get_status(&self) -> Response {
        let config = self.registry.daemon_config_snapshot();
        Response::ok(serde_json::json!({
            "version": config.version,
            "uptime": self.started_at.elapsed().as_secs(),
            "printerCount": self.registry.printer_count(),
            "activeStreamers": self.registry.active_streamer_count(),
            "inactiveStreamers": self.registry.printer_count().saturating_sub(self.registry.active_streamer_count()),
            "totalClients": self.registry.total_client_count(),
            "listenInterfaces": config.listen_interfaces,
        }))
    }

    async fn modify_printer(&self, data: Value) -> Response {
        #[derive(Deserialize)]
        struct ModifyRequest {
            original_name: String,
            config: PrinterConfig,
        }
        match serde_json::from_value::<ModifyRequest>(data) {
            Ok(req) => match self.registry.modify_printer(&req.original_name, req.config).await {
                Ok(()) => Response::ok_empty(),
                Err(e) => Response::err(e),
            },
            Err(e) => Response::err(IpcError::MalformedRequest(e.to_string())),
        }
    }

    async fn set_led(&self, data: Value) -> Response {
        #[derive(Deserialize)]
        struct SetLedRequest {
            name: String,
            #[serde(default)]
            on: bool,
            #[serde(default)]
            brightness: Option<u32>,
        }
        match serde_json::from_value::<SetLedRequest>(data) {
            Ok(req) => match self.registry.set_led(&req.name, req.on, req.brightness).await {
                Ok(()) => Response::ok(serde_json::json!({"type": "led", "isOn": req.on, "brightness": req.brightness})),
                Err(e) => Response::err(e),
            },
            Err(e) => Response::err(IpcError::MalformedRequest(e.to_string())),
        }
    }

    async fn change_interfaces(&self, data: Value) -> Response {
        #[derive(Deserialize)]
        struct ChangeInterfacesRequest {
            interfaces: Vec<String>,
        }
        match serde_json::from_value::<ChangeInterfacesRequest>(data) {
            Ok(req) => match self.registry.change_interfaces(req.interfaces).await {
                Ok(()) => Response::ok_empty(),
                Err(e) => Response::err(e),
            },
            Err(e) => Response::err(IpcError::MalformedRequest(e.to_string())),
        }
    }

}

fn parse_name(data: &Value) -> Result<String> {
    data.get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| IpcError::MalformedRequest("missing 'name' field".to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line_delimited_request() {
        let req: Request = serde_json::from_str(r#"{"command":"GetStatus","data":{}}"#).unwrap();
        assert_eq!(req.command, "GetStatus");
    }

    #[test]
    fn response_omits_absent_fields() {
        let resp = Response::ok_empty();
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"ok":true}"#);
    }

    #[test]
    fn parse_name_rejects_missing_field() {
        let value = serde_json::json!({});
        assert!(parse_name(&value).is_err());
    }
}

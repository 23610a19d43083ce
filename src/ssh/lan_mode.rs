//! LanModeService (spec §4.4): tunnels to the printer's loopback-only JSON
//! API over SSH and drives the "open LAN print mode if not already open"
//! handshake used before MQTT connect when `autoLanMode` is set.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::Instant;

use crate::error::{LanModeError, Result};

use super::session::SshSession;

const LOOPBACK_API_PORT: u16 = 8081;
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const OPEN_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct LanRequest<'a> {
    op: &'a str,
}

#[derive(Debug, Deserialize)]
struct LanResponse {
    status: String,
}

pub struct LanModeResult {
    pub success: bool,
    pub was_already_open: bool,
    pub error: Option<String>,
}

pub struct LanModeService;

impl LanModeService {
    pub async fn ensure_open(host: &str, port: u16, username: &str, password: &str) -> Result<LanModeResult> {
        let mut session = SshSession::connect(host, port, username, password).await?;

        let was_already_open = match Self::query_status(&mut session).await {
            Ok(open) => open,
            Err(e) => {
                session.close().await;
                return Ok(LanModeResult { success: false, was_already_open: false, error: Some(e.to_string()) });
            }
        };

        if was_already_open {
            session.close().await;
            return Ok(LanModeResult { success: true, was_already_open: true, error: None });
        }

        if let Err(e) = Self::send_open(&mut session).await {
            session.close().await;
            return Ok(LanModeResult { success: false, was_already_open: false, error: Some(e.to_string()) });
        }

        let started = Instant::now();
        loop {
            if started.elapsed() >= OPEN_DEADLINE {
                session.close().await;
                return Err(LanModeError::DeadlineElapsed.into());
            }
            match Self::query_status(&mut session).await {
                Ok(true) => {
                    session.close().await;
                    return Ok(LanModeResult { success: true, was_already_open: false, error: None });
                }
                Ok(false) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => {
                    session.close().await;
                    return Ok(LanModeResult { success: false, was_already_open: false, error: Some(e.to_string()) });
                }
            }
        }
    }

    async fn query_status(session: &mut SshSession) -> Result<bool> {
        let response = Self::request(session, "query_lan_print_status").await?;
        Ok(response.status == "open")
    }

    async fn send_open(session: &mut SshSession) -> Result<()> {
        Self::request(session, "open_lan_print").await?;
        Ok(())
    }

    async fn request(session: &mut SshSession, op: &str) -> Result<LanResponse> {
        let channel = session.open_tunnel(LOOPBACK_API_PORT).await.map_err(|_| LanModeError::TunnelFailed)?;
        let mut stream = channel.into_stream();

        let request = serde_json::to_string(&LanRequest { op }).map_err(|_| LanModeError::MalformedResponse)?;
        stream.write_all(request.as_bytes()).await.map_err(|_| LanModeError::TunnelFailed)?;
        stream.write_all(b"\n").await.map_err(|_| LanModeError::TunnelFailed)?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(|_| LanModeError::TunnelFailed)?;

        serde_json::from_str(line.trim()).map_err(|_| LanModeError::MalformedResponse.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lan_response_parses_open_status() {
        let response: LanResponse = serde_json::from_str(r#"{"status":"open"}"#).unwrap();
        assert_eq!(response.status, "open");
    }

    #[test]
    fn lan_request_serializes_op_field() {
        let request = LanRequest { op: "query_lan_print_status" };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("query_lan_print_status"));
    }
}

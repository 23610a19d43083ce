//! JanusClient (spec §4.8): negotiates a streaming-plugin mountpoint and
//! video port against a Janus WebRTC gateway instance over its HTTP REST
//! transaction API (`POST /janus`, `POST /janus/{session}[/{handle}]`).

use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ObicoError, Result};

pub struct MountpointLease {
    pub mountpoint_id: u64,
    pub video_port: u16,
}

pub struct JanusClient {
    http: HttpClient,
    base_url: String,
    session_id: u64,
    handle_id: u64,
}

impl JanusClient {
    pub async fn connect(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let http = HttpClient::new();

        let session_id = janus_transaction(&http, &base_url, "create", json!({})).await?;
        let attach_url = format!("{base_url}/{session_id}");
        let handle_id = janus_transaction(&http, &attach_url, "attach", json!({ "plugin": "janus.plugin.streaming" })).await?;

        Ok(Self { http, base_url, session_id, handle_id })
    }

    fn handle_url(&self) -> String {
        format!("{}/{}/{}", self.base_url, self.session_id, self.handle_id)
    }

    /// Creates (or reuses) an RTP-fed mountpoint for `printer` and returns
    /// the UDP port the RTP streamer should send H.264 to.
    pub async fn negotiate_rtp_mountpoint(&self, printer: &str, video_port: u16) -> Result<MountpointLease> {
        let body = json!({
            "request": "create",
            "type": "rtp",
            "id": Uuid::new_v4().as_u128() as u64 & 0x7fff_ffff,
            "description": format!("acproxycam-{printer}"),
            "audio": false,
            "video": true,
            "videoport": video_port,
            "videopt": 96,
            "videortpmap": "H264/90000",
            "videofmtp": "profile-level-id=42e01f;packetization-mode=1",
        });
        let response = self.send_message(body).await?;
        let mountpoint_id = response
            .get("stream")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_u64)
            .ok_or_else(|| ObicoError::JanusFailed("mountpoint response missing id".to_string()))?;

        Ok(MountpointLease { mountpoint_id, video_port })
    }

    /// Creates a plain UDP mountpoint for MJPEG relay (spec §4.8 MJPEG mode).
    pub async fn negotiate_mjpeg_mountpoint(&self, printer: &str, video_port: u16) -> Result<MountpointLease> {
        let body = json!({
            "request": "create",
            "type": "rtp",
            "id": Uuid::new_v4().as_u128() as u64 & 0x7fff_ffff,
            "description": format!("acproxycam-{printer}-mjpeg"),
            "audio": false,
            "video": true,
            "videoport": video_port,
            "videopt": 26,
            "videortpmap": "JPEG/90000",
        });
        let response = self.send_message(body).await?;
        let mountpoint_id = response
            .get("stream")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_u64)
            .ok_or_else(|| ObicoError::JanusFailed("mountpoint response missing id".to_string()))?;

        Ok(MountpointLease { mountpoint_id, video_port })
    }

    pub async fn destroy_mountpoint(&self, mountpoint_id: u64) -> Result<()> {
        let body = json!({ "request": "destroy", "id": mountpoint_id });
        self.send_message(body).await?;
        Ok(())
    }

    async fn send_message(&self, body: Value) -> Result<Value> {
        let envelope = json!({ "janus": "message", "transaction": Uuid::new_v4().to_string(), "body": body });
        let response: Value = self
            .http
            .post(self.handle_url())
            .json(&envelope)
            .send()
            .await
            .map_err(|e| ObicoError::JanusFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| ObicoError::JanusFailed(e.to_string()))?;

        match response.get("janus").and_then(Value::as_str) {
            Some("success") | Some("ack") => Ok(response.get("plugindata").and_then(|p| p.get("data")).cloned().unwrap_or(Value::Null)),
            _ => Err(ObicoError::JanusFailed(format!("unexpected janus response: {response}")).into()),
        }
    }
}

async fn janus_transaction(http: &HttpClient, url: &str, kind: &str, extra: Value) -> Result<u64> {
    let mut envelope = json!({ "janus": kind, "transaction": Uuid::new_v4().to_string() });
    if let (Value::Object(base), Value::Object(extra)) = (&mut envelope, extra) {
        base.extend(extra);
    }

    let response: Value = http
        .post(url)
        .json(&envelope)
        .send()
        .await
        .map_err(|e| ObicoError::JanusFailed(e.to_string()))?
        .json()
        .await
        .map_err(|e| ObicoError::JanusFailed(e.to_string()))?;

    response
        .get("data")
        .and_then(|d| d.get("id"))
        .and_then(Value::as_u64)
        .ok_or_else(|| ObicoError::JanusFailed(format!("janus {kind} response missing data.id")).into())
}

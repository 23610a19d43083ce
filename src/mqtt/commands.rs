//! Command payload construction and ack parsing (spec §4.3, §4.7). As with
//! `topics.rs`, the exact vendor JSON shape is an unresolved unknown (spec
//! §9) -- this module defines one coherent shape so `MqttController` has a
//! concrete wire format, isolated to one file for later replacement.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraOp {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedOp {
    Get,
    Set,
}

#[derive(Debug, Serialize)]
pub struct CameraCommand<'a> {
    pub request_id: String,
    pub op: &'static str,
    pub device_id: &'a str,
    pub model_code: &'a str,
}

pub fn camera_command(op: CameraOp, device_id: &str, model_code: &str) -> (String, String) {
    let request_id = new_request_id();
    let cmd = CameraCommand {
        request_id: request_id.clone(),
        op: match op {
            CameraOp::Start => "camera_start",
            CameraOp::Stop => "camera_stop",
        },
        device_id,
        model_code,
    };
    (request_id, serde_json::to_string(&cmd).expect("camera command always serializes"))
}

#[derive(Debug, Serialize)]
pub struct LedCommand<'a> {
    pub request_id: String,
    pub op: &'static str,
    pub device_id: &'a str,
    pub on: Option<bool>,
    pub brightness: Option<u32>,
}

pub fn led_command(op: LedOp, device_id: &str, on: Option<bool>, brightness: Option<u32>) -> (String, String) {
    let request_id = new_request_id();
    let cmd = LedCommand {
        request_id: request_id.clone(),
        op: match op {
            LedOp::Get => "get",
            LedOp::Set => "set",
        },
        device_id,
        on,
        brightness,
    };
    (request_id, serde_json::to_string(&cmd).expect("led command always serializes"))
}

#[derive(Debug, Serialize)]
pub struct PrintStopCommand<'a> {
    pub request_id: String,
    pub op: &'static str,
    pub device_id: &'a str,
}

pub fn print_stop_command(device_id: &str) -> (String, String) {
    let request_id = new_request_id();
    let cmd = PrintStopCommand { request_id: request_id.clone(), op: "print_stop", device_id };
    (request_id, serde_json::to_string(&cmd).expect("print stop command always serializes"))
}

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parsed shape of anything arriving on the ack/state topics. Fields are
/// all optional since a single topic carries model-code advertisements,
/// camera ack/nack, LED replies, and print-state updates.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub request_id: Option<String>,
    pub model_code: Option<String>,
    pub camera_state: Option<String>,
    pub led_on: Option<bool>,
    pub led_brightness: Option<u32>,
    pub printer_state: Option<String>,
}

pub fn parse_inbound(payload: &[u8]) -> Option<InboundMessage> {
    serde_json::from_slice(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_command_carries_distinct_request_ids() {
        let (id1, _) = camera_command(CameraOp::Start, "D1", "M1");
        let (id2, _) = camera_command(CameraOp::Start, "D1", "M1");
        assert_ne!(id1, id2);
    }

    #[test]
    fn parses_inbound_model_code_advertisement() {
        let payload = br#"{"model_code":"M1"}"#;
        let msg = parse_inbound(payload).unwrap();
        assert_eq!(msg.model_code.as_deref(), Some("M1"));
        assert!(msg.request_id.is_none());
    }

    #[test]
    fn parses_inbound_camera_stopped_state() {
        let payload = br#"{"camera_state":"stopped"}"#;
        let msg = parse_inbound(payload).unwrap();
        assert_eq!(msg.camera_state.as_deref(), Some("stopped"));
    }
}

//! Axum handlers for the MjpegServer endpoint table (spec §4.2). The MJPEG
//! multipart-stream handler keeps the project's structural ancestor's
//! async-stream shape (`examples/retrontology-doorcam/src/streaming/handlers.rs`)
//! but reads from [`FrameHub`]'s latest-JPEG slot instead of a preroll ring
//! buffer, and paces at `max_fps` while any client is attached, `idle_fps`
//! otherwise (spec §4.2 `/stream`).

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::hls::playlist::{build_media_playlist, parse_blocking_reload_params, PlaylistOptions};

use super::client_counts::ClientKind;
use super::server::ServerState;

pub async fn stream_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let _guard = state.client_counts.acquire(ClientKind::Mjpeg);
    info!(printer = %state.printer, "mjpeg client connected");

    let stream = async_stream::stream! {
        let mut last_sequence = 0u64;
        loop {
            let fps = if state.client_counts.total() > 0 { state.max_fps } else { state.idle_fps }.max(1);
            let mut tick = interval(Duration::from_micros(1_000_000 / fps as u64));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await;

            let Some(frame) = state.frame_hub.latest_jpeg() else { continue };
            if frame.sequence == last_sequence {
                continue;
            }
            last_sequence = frame.sequence;

            let boundary = format!(
                "--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nX-Frame-Sequence: {}\r\n\r\n",
                frame.data.len(),
                frame.sequence,
            );
            yield Ok::<_, axum::Error>(Bytes::from(boundary));
            yield Ok(Bytes::from(frame.data.to_vec()));
            yield Ok(Bytes::from_static(b"\r\n"));
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "multipart/x-mixed-replace; boundary=FRAME")
        .header(header::CACHE_CONTROL, "no-cache, private")
        .header("Access-Control-Allow-Origin", "*")
        .body(axum::body::Body::from_stream(stream))
        .unwrap()
}

pub async fn snapshot_handler(State(state): State<ServerState>) -> impl IntoResponse {
    match state.frame_hub.snapshot(state.snapshot_deadline).await {
        Some(frame) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/jpeg")
            .body(axum::body::Body::from(frame.data.to_vec()))
            .unwrap(),
        None => Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(axum::body::Body::from("no frame available"))
            .unwrap(),
    }
}

pub async fn h264_ws_handler(State(state): State<ServerState>, ws: axum::extract::WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| h264_ws_session(socket, state))
}

/// Per spec §4.2: "a single framed envelope containing `[SPS][PPS]` on
/// connect, then NAL units". This implementation frames every binary
/// message as `[u32 length][u8 type: 0=param-sets,1=nal][payload]`, a choice
/// documented in DESIGN.md since the spec leaves the exact framing open.
async fn h264_ws_session(mut socket: axum::extract::ws::WebSocket, state: ServerState) {
    use axum::extract::ws::Message;

    let _guard = state.client_counts.acquire(ClientKind::H264Ws);
    let subscription = state.frame_hub.subscribe_h264();

    if let Some(params) = state.frame_hub.parameter_sets() {
        if socket.send(Message::Binary(encode_parameter_set_envelope(&params))).await.is_err() {
            return;
        }
    }

    loop {
        let packet = subscription.recv().await;
        let mut frame = Vec::with_capacity(5 + packet.data.len());
        frame.push(1u8);
        frame.extend_from_slice(&packet.data);
        if socket.send(Message::Binary(frame)).await.is_err() {
            debug!(printer = %state.printer, "h264 websocket client disconnected");
            break;
        }
    }
}

fn encode_parameter_set_envelope(params: &crate::frame::ParameterSets) -> Vec<u8> {
    let mut out = vec![0u8];
    out.extend_from_slice(&(params.sps.len() as u32).to_be_bytes());
    out.extend_from_slice(&params.sps);
    out.extend_from_slice(&(params.pps.len() as u32).to_be_bytes());
    out.extend_from_slice(&params.pps);
    out
}

#[derive(Deserialize)]
pub struct PlaylistQuery {
    #[serde(flatten)]
    raw: std::collections::HashMap<String, String>,
}

pub async fn hls_playlist_handler(State(state): State<ServerState>, Query(query): Query<PlaylistQuery>) -> impl IntoResponse {
    let query_string: String = query.raw.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
    if let Some((msn, part)) = parse_blocking_reload_params(&query_string) {
        let timeout = Duration::from_secs(5);
        match part {
            Some(part_id) => {
                if state.hls.wait_for_part(msn, part_id, timeout).await.is_none() {
                    return (StatusCode::REQUEST_TIMEOUT, "part did not arrive in time").into_response();
                }
            }
            None => {
                if state.hls.wait_for_segment(msn, timeout).await.is_none() {
                    return (StatusCode::REQUEST_TIMEOUT, "segment did not arrive in time").into_response();
                }
            }
        }
    }

    let segments = state.hls.segments();
    let options = PlaylistOptions {
        target_duration_secs: state.hls_target_duration_secs,
        part_target_duration_secs: state.hls_part_duration_secs,
        ll_hls_enabled: state.hls.ll_hls_enabled(),
    };
    let owned_segments: Vec<crate::hls::Segment> = segments.iter().map(|s| s.as_ref().clone()).collect();
    let playlist = build_media_playlist(&owned_segments, &options, &state.printer);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(axum::body::Body::from(playlist))
        .unwrap()
        .into_response()
}

pub async fn hls_fragment_handler(State(state): State<ServerState>, Path(filename): Path<String>) -> impl IntoResponse {
    if let Some(rest) = filename.strip_prefix("segment_").and_then(|s| s.split('.').next()) {
        let Ok(id) = rest.parse::<u64>() else {
            return (StatusCode::BAD_REQUEST, "malformed segment id").into_response();
        };
        return match state.hls.get_segment(id) {
            Some(segment) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, fragment_content_type(&state, &filename))
                .body(axum::body::Body::from(segment.data.clone()))
                .unwrap()
                .into_response(),
            None => (StatusCode::NOT_FOUND, "no such segment").into_response(),
        };
    }

    if let Some(rest) = filename.strip_prefix("part_").and_then(|s| s.strip_suffix(".m4s")) {
        if !state.hls.ll_hls_enabled() {
            return (StatusCode::NOT_FOUND, "LL-HLS parts are disabled").into_response();
        }
        let mut pieces = rest.splitn(2, '.');
        let (Some(segment_part), Some(part_part)) = (pieces.next(), pieces.next()) else {
            return (StatusCode::BAD_REQUEST, "malformed part id").into_response();
        };
        let (Ok(segment_id), Ok(part_id)) = (segment_part.parse::<u64>(), part_part.parse::<u32>()) else {
            return (StatusCode::BAD_REQUEST, "malformed part id").into_response();
        };
        return match state.hls.get_segment(segment_id).and_then(|s| s.parts.get(part_id as usize).cloned()) {
            Some(part) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "video/mp4")
                .body(axum::body::Body::from(part.data.clone()))
                .unwrap()
                .into_response(),
            None => (StatusCode::NOT_FOUND, "no such part").into_response(),
        };
    }

    (StatusCode::NOT_FOUND, "unrecognized hls fragment name").into_response()
}

fn fragment_content_type(state: &ServerState, filename: &str) -> &'static str {
    if state.hls.ll_hls_enabled() || filename.ends_with(".m4s") {
        "video/mp4"
    } else {
        "video/mp2t"
    }
}

pub async fn status_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let mut status = state.status.get();
    status.current_fps = if state.client_counts.total() > 0 { state.max_fps } else { state.idle_fps };
    Json(serde_json::json!({
        "printer": status.printer,
        "state": status.state,
        "currentFps": status.current_fps,
        "modelCode": status.model_code,
        "lastFrameAtMs": status.last_frame_at_ms,
        "consecutiveFailures": status.consecutive_failures,
        "clients": {
            "mjpeg": state.client_counts.mjpeg(),
            "h264Ws": state.client_counts.h264_ws(),
            "external": state.client_counts.external(),
        },
    }))
}

#[derive(Deserialize)]
pub struct LedRequest {
    pub on: bool,
    pub brightness: Option<u32>,
}

pub async fn led_get_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let (on, brightness) = state.led.get_led().await;
    Json(serde_json::json!({ "on": on, "brightness": brightness }))
}

pub async fn led_put_handler(State(state): State<ServerState>, Json(request): Json<LedRequest>) -> impl IntoResponse {
    match state.led.set_led(request.on, request.brightness).await {
        Ok(()) => Json(serde_json::json!({ "on": request.on, "brightness": request.brightness })).into_response(),
        Err(e) => {
            warn!(printer = %state.printer, error = %e, "failed to set led");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

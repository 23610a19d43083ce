#![allow(dead_code)]
//! Frame-level data types shared by FrameHub, the streaming server, and the
//! H.264/FLV helpers (spec §3 Frame/JpegFrame/H264Packet/HlsSegment).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single decoded YUV frame. At most one lives in the FrameHub's latest-frame
/// slot at a time; readers clone the `Arc` rather than the bytes.
#[derive(Debug, Clone)]
pub struct YuvFrame {
    pub data: Arc<[u8]>,
    pub stride: u32,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    pub captured_at: SystemTime,
}

impl YuvFrame {
    pub fn new(data: Vec<u8>, stride: u32, width: u32, height: u32, sequence: u64) -> Self {
        Self { data: data.into(), stride, width, height, sequence, captured_at: SystemTime::now() }
    }
}

/// A cached JPEG encoding of the most recent frame, recomputed at the
/// worker's currently-applicable frame rate (spec §4.1 latest-JPEG slot).
#[derive(Debug, Clone)]
pub struct JpegFrame {
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    pub encoded_at: SystemTime,
}

impl JpegFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self { data: data.into(), width, height, sequence, encoded_at: SystemTime::now() }
    }

    pub fn age_millis(&self) -> u128 {
        self.encoded_at.elapsed().unwrap_or_default().as_millis()
    }

    pub fn timestamp_millis(&self) -> u128 {
        self.encoded_at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
    }
}

/// A single AVCC-formatted H.264 NAL unit as it flows through the FrameHub's
/// H.264 broadcast channel (spec §3 H264Packet, §4.1 channel 2).
#[derive(Debug, Clone)]
pub struct H264Packet {
    /// Length-prefixed (AVCC) NAL bytes, NOT including SPS/PPS -- those are
    /// carried out of band in [`ParameterSets`].
    pub data: Arc<[u8]>,
    pub is_keyframe: bool,
    /// 90 kHz presentation timestamp.
    pub pts_90khz: u64,
    pub sequence: u64,
}

impl H264Packet {
    pub fn new(data: Vec<u8>, is_keyframe: bool, pts_90khz: u64, sequence: u64) -> Self {
        Self { data: data.into(), is_keyframe, pts_90khz, sequence }
    }
}

/// The extradata-derived parameter sets shared by every consumer of a
/// worker's H.264 stream (spec §3 H264Packet, §4.2 "resend SPS/PPS").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
    pub nal_length_size: u8,
}

impl ParameterSets {
    pub fn new(sps: Vec<u8>, pps: Vec<u8>, nal_length_size: u8) -> Self {
        Self { sps, pps, nal_length_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_frame_timestamp_is_populated() {
        let frame = JpegFrame::new(vec![0xFF, 0xD8], 1920, 1080, 1);
        assert!(frame.timestamp_millis() > 0);
    }

    #[test]
    fn h264_packet_preserves_keyframe_flag() {
        let pkt = H264Packet::new(vec![1, 2, 3], true, 9000, 1);
        assert!(pkt.is_keyframe);
        assert_eq!(pkt.pts_90khz, 9000);
    }
}

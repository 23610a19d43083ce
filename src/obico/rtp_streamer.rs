//! Janus-facing media streamer (spec §4.8): H.264 mode packetizes AVCC
//! packets into RFC 6184 RTP via [`crate::h264::RtpPacketizer`], prepending
//! SPS/PPS before every keyframe; MJPEG mode UDP-sends base64-chunked JPEG
//! frames at roughly 4ms between chunks.

use std::net::SocketAddr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::random;
use tokio::net::UdpSocket;
use tracing::warn;

use crate::error::{ObicoError, Result};
use crate::frame::{H264Packet, JpegFrame, ParameterSets};
use crate::h264::RtpPacketizer;

const MJPEG_CHUNK_SIZE: usize = 1200;
const MJPEG_INTER_CHUNK_DELAY: Duration = Duration::from_millis(4);
const H264_PAYLOAD_TYPE: u8 = 96;

pub struct H264RtpStreamer {
    socket: UdpSocket,
    target: SocketAddr,
    packetizer: RtpPacketizer,
    parameter_sets: Option<ParameterSets>,
}

impl H264RtpStreamer {
    pub async fn bind(target: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(target).await?;
        Ok(Self { socket, target, packetizer: RtpPacketizer::new(random(), H264_PAYLOAD_TYPE), parameter_sets: None })
    }

    pub fn set_parameter_sets(&mut self, params: ParameterSets) {
        self.parameter_sets = Some(params);
    }

    pub async fn send_packet(&mut self, packet: &H264Packet) -> Result<()> {
        let mut nals = Vec::new();
        if packet.is_keyframe {
            if let Some(params) = &self.parameter_sets {
                nals.push(params.sps.clone());
                nals.push(params.pps.clone());
            }
        }
        nals.push(packet.data.to_vec());

        for rtp_packet in self.packetizer.packetize_frame(&nals, (packet.pts_90khz & 0xffff_ffff) as u32) {
            let bytes = marshal_rtp_packet(&rtp_packet);
            if let Err(e) = self.socket.send(&bytes).await {
                warn!(target = %self.target, error = %e, "janus rtp send failed");
            }
        }
        Ok(())
    }
}

/// Serializes an RTP packet per RFC 3550 §5.1. `rtp::packet::Packet` carries
/// no built-in serializer in the version pinned here, so the 12-byte fixed
/// header is written by hand (no CSRC list, no extension -- neither field
/// the packetizer ever sets).
fn marshal_rtp_packet(packet: &rtp::packet::Packet) -> Vec<u8> {
    let header = &packet.header;
    let mut bytes = Vec::with_capacity(12 + packet.payload.len());

    let byte0 = (header.version << 6) | ((header.padding as u8) << 5) | ((header.extension as u8) << 4) | header.csrc.len() as u8;
    bytes.push(byte0);

    let byte1 = ((header.marker as u8) << 7) | (header.payload_type & 0x7f);
    bytes.push(byte1);

    bytes.extend_from_slice(&header.sequence_number.to_be_bytes());
    bytes.extend_from_slice(&header.timestamp.to_be_bytes());
    bytes.extend_from_slice(&header.ssrc.to_be_bytes());
    for csrc in &header.csrc {
        bytes.extend_from_slice(&csrc.to_be_bytes());
    }
    bytes.extend_from_slice(&packet.payload);
    bytes
}

pub struct MjpegUdpStreamer {
    socket: UdpSocket,
    target: SocketAddr,
    frame_id: u32,
}

impl MjpegUdpStreamer {
    pub async fn bind(target: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(target).await?;
        Ok(Self { socket, target, frame_id: 0 })
    }

    /// Base64-encodes `frame` and UDP-sends it in chunks, sleeping
    /// [`MJPEG_INTER_CHUNK_DELAY`] between sends so a single frame doesn't
    /// saturate the link.
    pub async fn send_frame(&mut self, frame: &JpegFrame) -> Result<()> {
        self.frame_id = self.frame_id.wrapping_add(1);
        let encoded = BASE64.encode(frame.data.as_ref());
        let chunks: Vec<&str> = encoded.as_bytes().chunks(MJPEG_CHUNK_SIZE).map(|c| std::str::from_utf8(c).unwrap_or_default()).collect();
        let total = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            let envelope = format!("{{\"id\":{},\"i\":{i},\"n\":{total},\"d\":\"{chunk}\"}}", self.frame_id);
            if let Err(e) = self.socket.send(envelope.as_bytes()).await {
                warn!(target = %self.target, error = %e, "janus mjpeg send failed");
                break;
            }
            if i + 1 != total {
                tokio::time::sleep(MJPEG_INTER_CHUNK_DELAY).await;
            }
        }
        Ok(())
    }
}

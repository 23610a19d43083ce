//! FLV muxer (spec §4.10): 13-byte header, `onMetaData` script tag,
//! AVCDecoderConfigurationRecord tag, and per-frame video tags. SPS/PPS NALs
//! are filtered out of per-frame video tags -- they live only in the config
//! tag, per spec and per testable property 4 (round trip).
//!
//! Grounded structurally on SentryShot's GOP/segment muxer
//! (`other_examples/.../sentryshot__src-streamer-muxer.rs`): a thin
//! container writer fed a steady stream of already-decoded AVCC packets,
//! tracking its own running timestamp rather than trusting wall-clock time.

use crate::frame::{H264Packet, ParameterSets};

const FLV_HEADER: [u8; 9] = *b"FLV\x01\x01\x00\x00\x00\x09";
const TAG_TYPE_SCRIPT: u8 = 0x12;
const TAG_TYPE_VIDEO: u8 = 0x09;
const CODEC_ID_AVC: u8 = 7;
const AVC_PACKET_TYPE_SEQ_HEADER: u8 = 0;
const AVC_PACKET_TYPE_NALU: u8 = 1;
const NAL_TYPE_SPS: u8 = 7;
const NAL_TYPE_PPS: u8 = 8;

pub struct FlvMuxer {
    fps: u32,
    frame_index: u64,
}

impl FlvMuxer {
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1), frame_index: 0 }
    }

    /// The 9-byte FLV signature plus the mandatory leading PreviousTagSize0.
    pub fn file_header() -> Vec<u8> {
        let mut out = Vec::with_capacity(13);
        out.extend_from_slice(&FLV_HEADER);
        out.extend_from_slice(&0u32.to_be_bytes());
        out
    }

    /// `onMetaData` script tag carrying width/height/framerate/codecid.
    pub fn metadata_tag(&self, width: u32, height: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        amf0_write_string(&mut payload, "onMetaData");
        amf0_write_ecma_array(
            &mut payload,
            &[
                ("width", width as f64),
                ("height", height as f64),
                ("framerate", self.fps as f64),
                ("videocodecid", CODEC_ID_AVC as f64),
            ],
        );
        write_tag(TAG_TYPE_SCRIPT, 0, &payload)
    }

    /// AVCDecoderConfigurationRecord tag (AVCPacketType = 0).
    pub fn config_tag(&self, params: &ParameterSets) -> Vec<u8> {
        let mut record = Vec::new();
        record.push(1); // configurationVersion
        record.push(params.sps.get(1).copied().unwrap_or(0)); // profile
        record.push(params.sps.get(2).copied().unwrap_or(0)); // compat
        record.push(params.sps.get(3).copied().unwrap_or(0)); // level
        record.push(0xFC | (params.nal_length_size.saturating_sub(1) & 0x03));
        record.push(0xE0 | 1); // numSPS = 1
        record.extend_from_slice(&(params.sps.len() as u16).to_be_bytes());
        record.extend_from_slice(&params.sps);
        record.push(1); // numPPS
        record.extend_from_slice(&(params.pps.len() as u16).to_be_bytes());
        record.extend_from_slice(&params.pps);

        let mut payload = Vec::with_capacity(5 + record.len());
        payload.push(0x17); // keyframe | AVC
        payload.push(AVC_PACKET_TYPE_SEQ_HEADER);
        payload.extend_from_slice(&[0, 0, 0]); // composition time
        payload.extend_from_slice(&record);

        write_tag(TAG_TYPE_VIDEO, 0, &payload)
    }

    /// One per-frame video tag. `packet.data` is expected to already be a
    /// single AVCC-framed NAL (4-byte length prefix); SPS/PPS NALs are
    /// stripped if present, since those belong only in the config tag.
    pub fn video_tag(&mut self, packet: &H264Packet, nal_length_size: u8) -> Vec<u8> {
        let timestamp = self.frame_index * 1000 / self.fps as u64;
        self.frame_index += 1;

        let stripped = strip_parameter_set_nals(&packet.data, nal_length_size);

        let mut payload = Vec::with_capacity(5 + stripped.len());
        payload.push(if packet.is_keyframe { 0x17 } else { 0x27 });
        payload.push(AVC_PACKET_TYPE_NALU);
        payload.extend_from_slice(&[0, 0, 0]);
        payload.extend_from_slice(&stripped);

        write_tag(TAG_TYPE_VIDEO, timestamp as u32, &payload)
    }

    /// Extracts the video-frame NAL units from a muxed buffer containing one
    /// or more tags (used by the round-trip test, invariant 4). SPS/PPS are
    /// never present in per-frame tags, so none need filtering here; any
    /// slipping in would indicate a muxer bug.
    pub fn demux_video_nals(data: &[u8]) -> Vec<Vec<u8>> {
        let mut offset = if data.starts_with(&FLV_HEADER) { FLV_HEADER.len() + 4 } else { 0 };
        let mut nals = Vec::new();

        while offset + 11 <= data.len() {
            let tag_type = data[offset];
            let data_size = u32::from_be_bytes([0, data[offset + 1], data[offset + 2], data[offset + 3]]) as usize;
            let tag_start = offset + 11;
            let tag_end = tag_start + data_size;
            if tag_end > data.len() {
                break;
            }

            if tag_type == TAG_TYPE_VIDEO {
                let body = &data[tag_start..tag_end];
                if body.len() > 5 && body[1] == AVC_PACKET_TYPE_NALU {
                    for nal in crate::h264::nal::split_avcc(&body[5..], 4) {
                        nals.push(nal.to_vec());
                    }
                }
            }

            offset = tag_end + 4; // skip PreviousTagSize
        }
        nals
    }
}

fn strip_parameter_set_nals(avcc_data: &[u8], length_size: u8) -> Vec<u8> {
    let length_size = length_size.clamp(1, 4);
    let nals = crate::h264::nal::split_avcc(avcc_data, length_size);
    let mut out = Vec::with_capacity(avcc_data.len());
    for nal in nals {
        if nal.is_empty() {
            continue;
        }
        let nal_type = nal[0] & 0x1F;
        if nal_type == NAL_TYPE_SPS || nal_type == NAL_TYPE_PPS {
            continue;
        }
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

fn write_tag(tag_type: u8, timestamp: u32, payload: &[u8]) -> Vec<u8> {
    let mut tag = Vec::with_capacity(11 + payload.len() + 4);
    tag.push(tag_type);
    let data_size = (payload.len() as u32).to_be_bytes();
    tag.extend_from_slice(&data_size[1..]); // 3-byte DataSize
    let ts_bytes = timestamp.to_be_bytes();
    tag.extend_from_slice(&ts_bytes[1..]); // 3-byte timestamp
    tag.push(ts_bytes[0]); // TimestampExtended
    tag.extend_from_slice(&[0, 0, 0]); // StreamID
    tag.extend_from_slice(payload);
    let tag_size = (11 + payload.len()) as u32;
    tag.extend_from_slice(&tag_size.to_be_bytes());
    tag
}

fn amf0_write_string(out: &mut Vec<u8>, s: &str) {
    out.push(0x02);
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn amf0_write_ecma_array(out: &mut Vec<u8>, entries: &[(&str, f64)]) {
    out.push(0x08);
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (key, value) in entries {
        out.extend_from_slice(&(key.len() as u16).to_be_bytes());
        out.extend_from_slice(key.as_bytes());
        out.push(0x00); // AMF0 number type
        out.extend_from_slice(&value.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0, 0x09]); // empty key + object-end marker
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(nals: &[&[u8]], keyframe: bool, seq: u64) -> H264Packet {
        let mut data = Vec::new();
        for nal in nals {
            data.extend_from_slice(&(nal.len() as u32).to_be_bytes());
            data.extend_from_slice(nal);
        }
        H264Packet::new(data, keyframe, seq * 3000, seq)
    }

    #[test]
    fn round_trip_strips_sps_pps_and_preserves_frame_nals() {
        let mut muxer = FlvMuxer::new(15);
        let sps: &[u8] = &[0x67, 0xAA];
        let pps: &[u8] = &[0x68, 0xBB];
        let slice1: &[u8] = &[0x65, 0x01, 0x02];
        let slice2: &[u8] = &[0x41, 0x03];

        let mut muxed = FlvMuxer::file_header();
        muxed.extend(muxer.metadata_tag(1920, 1080));
        muxed.extend(muxer.config_tag(&ParameterSets::new(sps.to_vec(), pps.to_vec(), 4)));
        muxed.extend(muxer.video_tag(&packet(&[sps, pps, slice1], true, 0), 4));
        muxed.extend(muxer.video_tag(&packet(&[slice2], false, 1), 4));

        let nals = FlvMuxer::demux_video_nals(&muxed);
        assert_eq!(nals, vec![slice1.to_vec(), slice2.to_vec()]);
    }

    #[test]
    fn video_tag_timestamps_advance_at_1000_over_fps() {
        let mut muxer = FlvMuxer::new(10);
        let p = packet(&[&[0x65, 0x01]], true, 0);
        let tag0 = muxer.video_tag(&p, 4);
        let tag1 = muxer.video_tag(&p, 4);

        let ts0 = u32::from_be_bytes([tag0[7], tag0[4], tag0[5], tag0[6]]);
        let ts1 = u32::from_be_bytes([tag1[7], tag1[4], tag1[5], tag1[6]]);
        assert_eq!(ts0, 0);
        assert_eq!(ts1, 100);
    }

    #[test]
    fn keyframe_and_interframe_flags() {
        let mut muxer = FlvMuxer::new(15);
        let key_tag = muxer.video_tag(&packet(&[&[0x65]], true, 0), 4);
        let inter_tag = muxer.video_tag(&packet(&[&[0x41]], false, 1), 4);
        assert_eq!(key_tag[11], 0x17);
        assert_eq!(inter_tag[11], 0x27);
    }
}

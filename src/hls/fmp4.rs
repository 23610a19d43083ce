//! Minimal fragmented-MP4 (fMP4) writer: an init segment (`ftyp`+`moov`) and
//! per-fragment `moof`+`mdat` boxes, used for LL-HLS parts (spec §4.2, §9
//! "LL-HLS requires fMP4"). No ISO-BMFF crate exists in the reference pack,
//! so this is hand-built directly against the box layout, structurally
//! informed by the fragment/session bookkeeping in SentryShot's muxer
//! (`other_examples/.../sentryshot__src-streamer-muxer.rs`) even though that
//! muxer's own box-writing code was not part of the retrieved excerpt.

use crate::frame::{H264Packet, ParameterSets};

pub struct Fmp4Muxer {
    track_id: u32,
    timescale: u32,
    next_sequence_number: u32,
}

impl Fmp4Muxer {
    pub fn new(timescale: u32) -> Self {
        Self { track_id: 1, timescale, next_sequence_number: 1 }
    }

    /// `ftyp` + `moov` (with `mvex`, since every sample lives in a later
    /// `moof`/`mdat` pair) describing a single AVC video track.
    pub fn init_segment(&self, params: &ParameterSets, width: u32, height: u32) -> Vec<u8> {
        let ftyp = build_box(b"ftyp", &ftyp_payload());
        let moov = build_box(b"moov", &self.moov_payload(params, width, height));
        let mut out = Vec::with_capacity(ftyp.len() + moov.len());
        out.extend_from_slice(&ftyp);
        out.extend_from_slice(&moov);
        out
    }

    /// `moof` + `mdat` for one fragment (an LL-HLS part, or a whole segment
    /// when LL-HLS is disabled). `packets` must already be AVCC-framed with
    /// a 4-byte length prefix.
    pub fn mux_fragment(&mut self, packets: &[H264Packet], duration_ticks: u32) -> Vec<u8> {
        let sequence_number = self.next_sequence_number;
        self.next_sequence_number += 1;

        let mdat_payload = concat_sample_data(packets);
        let moof = build_box(b"moof", &self.moof_payload(packets, sequence_number, duration_ticks, mdat_payload.len()));
        let mdat = build_box(b"mdat", &mdat_payload);

        let mut out = Vec::with_capacity(moof.len() + mdat.len());
        out.extend_from_slice(&moof);
        out.extend_from_slice(&mdat);
        out
    }

    fn moov_payload(&self, params: &ParameterSets, width: u32, height: u32) -> Vec<u8> {
        let mvhd = build_box(b"mvhd", &mvhd_payload(self.timescale));
        let trak = build_box(b"trak", &self.trak_payload(params, width, height));
        let mvex = build_box(b"mvex", &build_box(b"trex", &trex_payload(self.track_id)));
        let mut out = Vec::new();
        out.extend_from_slice(&mvhd);
        out.extend_from_slice(&trak);
        out.extend_from_slice(&mvex);
        out
    }

    fn trak_payload(&self, params: &ParameterSets, width: u32, height: u32) -> Vec<u8> {
        let tkhd = build_box(b"tkhd", &tkhd_payload(self.track_id, width, height));
        let mdia = build_box(b"mdia", &self.mdia_payload(params, width, height));
        let mut out = Vec::new();
        out.extend_from_slice(&tkhd);
        out.extend_from_slice(&mdia);
        out
    }

    fn mdia_payload(&self, params: &ParameterSets, width: u32, height: u32) -> Vec<u8> {
        let mdhd = build_box(b"mdhd", &mdhd_payload(self.timescale));
        let hdlr = build_box(b"hdlr", &hdlr_payload());
        let minf = build_box(b"minf", &self.minf_payload(params, width, height));
        let mut out = Vec::new();
        out.extend_from_slice(&mdhd);
        out.extend_from_slice(&hdlr);
        out.extend_from_slice(&minf);
        out
    }

    fn minf_payload(&self, params: &ParameterSets, width: u32, height: u32) -> Vec<u8> {
        let vmhd = build_box(b"vmhd", &[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
        let dinf = build_box(b"dinf", &build_box(b"dref", &dref_payload()));
        let stbl = build_box(b"stbl", &self.stbl_payload(params, width, height));
        let mut out = Vec::new();
        out.extend_from_slice(&vmhd);
        out.extend_from_slice(&dinf);
        out.extend_from_slice(&stbl);
        out
    }

    fn stbl_payload(&self, params: &ParameterSets, width: u32, height: u32) -> Vec<u8> {
        let stsd = build_box(b"stsd", &stsd_payload(params, width, height));
        let empty_table = |tag: &[u8; 4]| build_box(tag, &[0, 0, 0, 0, 0, 0, 0, 0]);
        let mut out = Vec::new();
        out.extend_from_slice(&stsd);
        out.extend_from_slice(&empty_table(b"stts"));
        out.extend_from_slice(&empty_table(b"stsc"));
        out.extend_from_slice(&build_box(b"stsz", &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
        out.extend_from_slice(&empty_table(b"stco"));
        out
    }

    fn moof_payload(&self, packets: &[H264Packet], sequence_number: u32, duration_ticks: u32, mdat_len: usize) -> Vec<u8> {
        let mfhd = build_box(b"mfhd", &sequence_number.to_be_bytes_with_version());
        let traf = build_box(b"traf", &self.traf_payload(packets, duration_ticks, mdat_len));
        let mut out = Vec::new();
        out.extend_from_slice(&mfhd);
        out.extend_from_slice(&traf);
        out
    }

    fn traf_payload(&self, packets: &[H264Packet], duration_ticks: u32, mdat_len: usize) -> Vec<u8> {
        let tfhd = build_box(b"tfhd", &tfhd_payload(self.track_id));
        let tfdt = build_box(b"tfdt", &tfdt_payload(packets.first().map(|p| p.pts_90khz).unwrap_or(0)));
        let trun = build_box(b"trun", &trun_payload(packets, duration_ticks, mdat_len));
        let mut out = Vec::new();
        out.extend_from_slice(&tfhd);
        out.extend_from_slice(&tfdt);
        out.extend_from_slice(&trun);
        out
    }
}

trait BeVersioned {
    fn to_be_bytes_with_version(self) -> Vec<u8>;
}
impl BeVersioned for u32 {
    fn to_be_bytes_with_version(self) -> Vec<u8> {
        let mut out = vec![0, 0, 0, 0]; // version(1) + flags(3)
        out.extend_from_slice(&self.to_be_bytes());
        out
    }
}

fn concat_sample_data(packets: &[H264Packet]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in packets {
        out.extend_from_slice(&p.data);
    }
    out
}

fn build_box(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let size = (8 + payload.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(payload);
    out
}

fn ftyp_payload() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"iso5");
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(b"iso5");
    out.extend_from_slice(b"iso6");
    out.extend_from_slice(b"mp41");
    out
}

fn mvhd_payload(timescale: u32) -> Vec<u8> {
    let mut out = vec![0, 0, 0, 0]; // version + flags
    out.extend_from_slice(&0u32.to_be_bytes()); // creation time
    out.extend_from_slice(&0u32.to_be_bytes()); // modification time
    out.extend_from_slice(&timescale.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // duration: unknown (fragmented)
    out.extend_from_slice(&0x00010000u32.to_be_bytes()); // rate 1.0
    out.extend_from_slice(&[0x01, 0x00]); // volume 1.0
    out.extend_from_slice(&[0, 0]); // reserved
    out.extend_from_slice(&[0u8; 8]); // reserved
    // unity matrix
    for v in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(&[0u8; 24]); // pre_defined
    out.extend_from_slice(&2u32.to_be_bytes()); // next_track_id
    out
}

fn tkhd_payload(track_id: u32, width: u32, height: u32) -> Vec<u8> {
    let mut out = vec![0, 0, 0, 0x07]; // version + flags (enabled|in movie|in preview)
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&track_id.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // reserved
    out.extend_from_slice(&0u32.to_be_bytes()); // duration
    out.extend_from_slice(&[0u8; 8]); // reserved
    out.extend_from_slice(&[0u8; 2]); // layer
    out.extend_from_slice(&[0u8; 2]); // alternate group
    out.extend_from_slice(&[0u8; 2]); // volume (0 for video)
    out.extend_from_slice(&[0u8; 2]); // reserved
    for v in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(&(width << 16).to_be_bytes());
    out.extend_from_slice(&(height << 16).to_be_bytes());
    out
}

fn mdhd_payload(timescale: u32) -> Vec<u8> {
    let mut out = vec![0, 0, 0, 0];
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&timescale.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // duration
    out.extend_from_slice(&[0x55, 0xC4]); // language "und"
    out.extend_from_slice(&[0u8; 2]);
    out
}

fn hdlr_payload() -> Vec<u8> {
    let mut out = vec![0, 0, 0, 0];
    out.extend_from_slice(&0u32.to_be_bytes()); // pre_defined
    out.extend_from_slice(b"vide");
    out.extend_from_slice(&[0u8; 12]); // reserved
    out.extend_from_slice(b"acproxycam\0");
    out
}

fn dref_payload() -> Vec<u8> {
    let mut out = vec![0, 0, 0, 0];
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&build_box(b"url ", &[0, 0, 0, 1]));
    out
}

fn stsd_payload(params: &ParameterSets, width: u32, height: u32) -> Vec<u8> {
    let mut out = vec![0, 0, 0, 0];
    out.extend_from_slice(&1u32.to_be_bytes()); // entry_count
    out.extend_from_slice(&build_box(b"avc1", &avc1_payload(params, width, height)));
    out
}

fn avc1_payload(params: &ParameterSets, width: u32, height: u32) -> Vec<u8> {
    let mut out = vec![0u8; 6]; // reserved
    out.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    out.extend_from_slice(&[0u8; 16]); // pre_defined/reserved
    out.extend_from_slice(&(width as u16).to_be_bytes());
    out.extend_from_slice(&(height as u16).to_be_bytes());
    out.extend_from_slice(&0x00480000u32.to_be_bytes()); // horizresolution 72dpi
    out.extend_from_slice(&0x00480000u32.to_be_bytes()); // vertresolution 72dpi
    out.extend_from_slice(&0u32.to_be_bytes()); // reserved
    out.extend_from_slice(&1u16.to_be_bytes()); // frame_count
    out.extend_from_slice(&[0u8; 32]); // compressorname
    out.extend_from_slice(&0x0018u16.to_be_bytes()); // depth
    out.extend_from_slice(&0xFFFFu16.to_be_bytes()); // pre_defined

    let mut avcc = vec![1, params.sps.get(1).copied().unwrap_or(0), params.sps.get(2).copied().unwrap_or(0), params.sps.get(3).copied().unwrap_or(0)];
    avcc.push(0xFC | (params.nal_length_size.saturating_sub(1) & 0x03));
    avcc.push(0xE0 | 1);
    avcc.extend_from_slice(&(params.sps.len() as u16).to_be_bytes());
    avcc.extend_from_slice(&params.sps);
    avcc.push(1);
    avcc.extend_from_slice(&(params.pps.len() as u16).to_be_bytes());
    avcc.extend_from_slice(&params.pps);
    out.extend_from_slice(&build_box(b"avcC", &avcc));
    out
}

fn trex_payload(track_id: u32) -> Vec<u8> {
    let mut out = vec![0, 0, 0, 0];
    out.extend_from_slice(&track_id.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes()); // default_sample_description_index
    out.extend_from_slice(&0u32.to_be_bytes()); // default_sample_duration
    out.extend_from_slice(&0u32.to_be_bytes()); // default_sample_size
    out.extend_from_slice(&0u32.to_be_bytes()); // default_sample_flags
    out
}

fn tfhd_payload(track_id: u32) -> Vec<u8> {
    let mut out = vec![0, 0, 0, 0];
    out.extend_from_slice(&track_id.to_be_bytes());
    out
}

fn tfdt_payload(base_media_decode_time: u64) -> Vec<u8> {
    let mut out = vec![1, 0, 0, 0]; // version 1: 64-bit decode time
    out.extend_from_slice(&base_media_decode_time.to_be_bytes());
    out
}

fn trun_payload(packets: &[H264Packet], default_duration: u32, _mdat_len: usize) -> Vec<u8> {
    // flags: data-offset present, sample-duration present, sample-size present, sample-flags present
    let flags: u32 = 0x000001 | 0x000100 | 0x000200 | 0x000400;
    let mut out = vec![0, (flags >> 16) as u8, (flags >> 8) as u8, flags as u8];
    out.extend_from_slice(&(packets.len() as u32).to_be_bytes());
    out.extend_from_slice(&0i32.to_be_bytes()); // data_offset, patched by caller if needed
    for p in packets {
        out.extend_from_slice(&default_duration.to_be_bytes());
        out.extend_from_slice(&(p.data.len() as u32).to_be_bytes());
        let sample_flags: u32 = if p.is_keyframe { 0x0200_0000 } else { 0x0101_0000 };
        out.extend_from_slice(&sample_flags.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ParameterSets {
        ParameterSets::new(vec![0x67, 0x42, 0, 0x1F], vec![0x68, 0xCE, 0x3C, 0x80], 4)
    }

    #[test]
    fn init_segment_starts_with_ftyp_then_moov() {
        let muxer = Fmp4Muxer::new(90_000);
        let init = muxer.init_segment(&params(), 1920, 1080);
        assert_eq!(&init[4..8], b"ftyp");
        let ftyp_size = u32::from_be_bytes([init[0], init[1], init[2], init[3]]) as usize;
        assert_eq!(&init[ftyp_size + 4..ftyp_size + 8], b"moov");
    }

    #[test]
    fn fragment_contains_moof_then_mdat_with_sample_bytes() {
        let mut muxer = Fmp4Muxer::new(90_000);
        let packets = vec![
            crate::frame::H264Packet::new(vec![0, 0, 0, 2, 0x65, 0x01], true, 0, 0),
        ];
        let fragment = muxer.mux_fragment(&packets, 3000);
        assert_eq!(&fragment[4..8], b"moof");
        let moof_size = u32::from_be_bytes([fragment[0], fragment[1], fragment[2], fragment[3]]) as usize;
        assert_eq!(&fragment[moof_size + 4..moof_size + 8], b"mdat");
        assert!(fragment.len() > moof_size + 8);
    }

    #[test]
    fn fragment_sequence_numbers_increase() {
        let mut muxer = Fmp4Muxer::new(90_000);
        let packets = vec![crate::frame::H264Packet::new(vec![0, 0, 0, 1, 0x65], true, 0, 0)];
        let f1 = muxer.mux_fragment(&packets, 3000);
        let f2 = muxer.mux_fragment(&packets, 3000);
        assert_ne!(f1, f2);
    }
}

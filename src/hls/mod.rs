//! HLS / LL-HLS segmenter, playlist generation, and the two interchangeable
//! segment container muxers (spec §4.2, §3 HlsSegment; open question in
//! spec §9: "HLS segment container (fMP4 vs MPEG-TS) is not fully pinned by
//! the existing code; LL-HLS requires fMP4" -- resolved in DESIGN.md as:
//! MPEG-TS by default, fMP4 whenever `llHlsEnabled`).

pub mod fmp4;
pub mod playlist;
pub mod segmenter;
pub mod ts;

pub use segmenter::{HlsSegmenter, Part, Segment};

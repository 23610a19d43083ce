//! H.264 / FLV helpers (spec §4.10, component C10).
//!
//! No FLV- or RTP-specific crate exists anywhere in the reference pack for
//! this exact container format, so these are hand-rolled against the spec's
//! byte-level description -- this is core, in-scope algorithmic work, not
//! ambient stack, so hand-rolling it is expected (see DESIGN.md). The RTP
//! packetizer builds on the `rtp` crate (grounded on mofeng-git-One-KVM's
//! dependency on the same crate for its WebRTC video path) for the packet
//! header/serialization, while the FU-A fragmentation logic itself is
//! spec-driven and implemented directly.

pub mod extradata;
pub mod flv;
pub mod nal;
pub mod rtp_packetizer;

pub use extradata::parse_extradata;
pub use flv::FlvMuxer;
pub use nal::{split_annex_b, split_avcc, NalFormat};
pub use rtp_packetizer::RtpPacketizer;

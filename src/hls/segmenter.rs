//! Segment/part ring and blocking-reload bookkeeping for HLS and LL-HLS
//! (spec §3 HlsSegment, §4.2). Structurally grounded on SentryShot's
//! muxer (`other_examples/.../sentryshot__src-streamer-muxer.rs`): a capped
//! ring of finished segments plus `tokio::sync::Notify`-based waiters that
//! let `GET .../_HLS_msn=N` requests block until segment/part `N` exists
//! instead of polling, which is exactly how that muxer's
//! `next_segments_on_hold` / `frames_on_hold` gates work.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::frame::{H264Packet, ParameterSets};
use crate::h264::fmp4::Fmp4Muxer as ContainerFmp4Muxer;
use crate::h264::nal::split_avcc;
use crate::hls::fmp4::Fmp4Muxer;
use crate::hls::ts::TsMuxer;

const DEFAULT_RING_CAPACITY: usize = 12;

#[derive(Clone)]
pub struct Part {
    pub id: u32,
    pub duration_ms: u32,
    pub independent: bool,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct Segment {
    pub id: u64,
    pub duration_ms: u32,
    pub independent: bool,
    pub data: Bytes,
    pub parts: Vec<Arc<Part>>,
}

enum Container {
    Ts(TsMuxer),
    Fmp4(Fmp4Muxer),
}

struct InProgress {
    packets: Vec<H264Packet>,
    started_pts_90khz: Option<u64>,
    part_started_pts_90khz: Option<u64>,
    part_packets: Vec<H264Packet>,
    next_part_id: u32,
    parts: Vec<Arc<Part>>,
}

impl InProgress {
    fn new() -> Self {
        Self {
            packets: Vec::new(),
            started_pts_90khz: None,
            part_started_pts_90khz: None,
            part_packets: Vec::new(),
            next_part_id: 0,
            parts: Vec::new(),
        }
    }
}

pub struct HlsSegmenter {
    printer: String,
    nal_length_size: u8,
    target_duration_ms: u32,
    part_duration_ms: u32,
    ll_hls_enabled: bool,

    container: Mutex<Container>,
    in_progress: Mutex<InProgress>,
    parameter_sets: Mutex<Option<ParameterSets>>,
    width: Mutex<(u32, u32)>,

    segments: Mutex<VecDeque<Arc<Segment>>>,
    next_segment_id: Mutex<u64>,

    new_segment: Notify,
    new_part: Notify,
}

impl HlsSegmenter {
    pub fn new(printer: impl Into<String>, target_duration_ms: u32, part_duration_ms: u32, ll_hls_enabled: bool) -> Self {
        let container = if ll_hls_enabled { Container::Fmp4(Fmp4Muxer::new(90_000)) } else { Container::Ts(TsMuxer::new()) };
        Self {
            printer: printer.into(),
            nal_length_size: 4,
            target_duration_ms,
            part_duration_ms,
            ll_hls_enabled,
            container: Mutex::new(container),
            in_progress: Mutex::new(InProgress::new()),
            parameter_sets: Mutex::new(None),
            width: Mutex::new((1920, 1080)),
            segments: Mutex::new(VecDeque::with_capacity(DEFAULT_RING_CAPACITY)),
            next_segment_id: Mutex::new(0),
            new_segment: Notify::new(),
            new_part: Notify::new(),
        }
    }

    pub fn printer(&self) -> &str {
        &self.printer
    }

    pub fn ll_hls_enabled(&self) -> bool {
        self.ll_hls_enabled
    }

    pub fn set_parameter_sets(&self, params: ParameterSets, width: u32, height: u32) {
        *self.parameter_sets.lock() = Some(params);
        *self.width.lock() = (width, height);
    }

    /// `Fmp4Muxer`'s own `init_segment()` needs width/height/params, so this
    /// is only meaningful once `set_parameter_sets` has been called.
    pub fn fmp4_init_segment(&self) -> Option<Bytes> {
        let params = self.parameter_sets.lock().clone()?;
        let (width, height) = *self.width.lock();
        let muxer = ContainerFmp4Muxer::new(90_000);
        Some(Bytes::from(muxer.init_segment(&params, width, height)))
    }

    /// Feeds one decoded/encoded packet into the current in-progress
    /// segment, finalizing a part and/or the whole segment as duration
    /// thresholds are crossed. Segments and (when LL-HLS is enabled) parts
    /// always start on a keyframe boundary.
    pub fn push_packet(&self, packet: H264Packet) {
        let mut in_progress = self.in_progress.lock();

        if in_progress.started_pts_90khz.is_none() {
            if !packet.is_keyframe {
                return; // wait for a keyframe to start the first segment
            }
            in_progress.started_pts_90khz = Some(packet.pts_90khz);
            in_progress.part_started_pts_90khz = Some(packet.pts_90khz);
        }

        let segment_elapsed_ms = pts_delta_ms(in_progress.started_pts_90khz.unwrap(), packet.pts_90khz);
        let part_elapsed_ms = pts_delta_ms(in_progress.part_started_pts_90khz.unwrap(), packet.pts_90khz);

        if self.ll_hls_enabled && part_elapsed_ms >= self.part_duration_ms && packet.is_keyframe {
            self.finalize_part(&mut in_progress);
        }

        if segment_elapsed_ms >= self.target_duration_ms && packet.is_keyframe {
            if self.ll_hls_enabled && !in_progress.part_packets.is_empty() {
                self.finalize_part(&mut in_progress);
            }
            self.finalize_segment(&mut in_progress);
            in_progress.started_pts_90khz = Some(packet.pts_90khz);
            in_progress.part_started_pts_90khz = Some(packet.pts_90khz);
        }

        in_progress.packets.push(packet.clone());
        if self.ll_hls_enabled {
            in_progress.part_packets.push(packet);
        }
    }

    fn finalize_part(&self, in_progress: &mut InProgress) {
        if in_progress.part_packets.is_empty() {
            return;
        }
        let independent = in_progress.part_packets.first().map(|p| p.is_keyframe).unwrap_or(false);
        let data = match &mut *self.container.lock() {
            Container::Fmp4(m) => Bytes::from(m.mux_fragment(&in_progress.part_packets, 3000)),
            Container::Ts(m) => Bytes::from(m.mux_fragment(&in_progress.part_packets, self.nal_length_size)),
        };
        let duration_ms = pts_delta_ms(
            in_progress.part_started_pts_90khz.unwrap_or(0),
            in_progress.part_packets.last().map(|p| p.pts_90khz).unwrap_or(0),
        )
        .max(1);

        let part = Arc::new(Part { id: in_progress.next_part_id, duration_ms, independent, data });
        in_progress.next_part_id += 1;
        in_progress.parts.push(part);
        in_progress.part_packets.clear();
        in_progress.part_started_pts_90khz = None;
        self.new_part.notify_waiters();
    }

    fn finalize_segment(&self, in_progress: &mut InProgress) {
        if in_progress.packets.is_empty() {
            return;
        }
        let independent = in_progress.packets.first().map(|p| p.is_keyframe).unwrap_or(false);
        let data = match &mut *self.container.lock() {
            Container::Fmp4(m) => Bytes::from(m.mux_fragment(&in_progress.packets, 3000)),
            Container::Ts(m) => Bytes::from(m.mux_fragment(&in_progress.packets, self.nal_length_size)),
        };
        let duration_ms = pts_delta_ms(
            in_progress.started_pts_90khz.unwrap_or(0),
            in_progress.packets.last().map(|p| p.pts_90khz).unwrap_or(0),
        )
        .max(1);

        let mut next_id = self.next_segment_id.lock();
        let segment = Arc::new(Segment { id: *next_id, duration_ms, independent, data, parts: std::mem::take(&mut in_progress.parts) });
        *next_id += 1;
        drop(next_id);

        let mut segments = self.segments.lock();
        segments.push_back(segment);
        while segments.len() > DEFAULT_RING_CAPACITY {
            segments.pop_front();
        }
        drop(segments);

        in_progress.packets.clear();
        in_progress.next_part_id = 0;
        self.new_segment.notify_waiters();
    }

    pub fn segments(&self) -> Vec<Arc<Segment>> {
        self.segments.lock().iter().cloned().collect()
    }

    pub fn get_segment(&self, id: u64) -> Option<Arc<Segment>> {
        self.segments.lock().iter().find(|s| s.id == id).cloned()
    }

    /// Blocks (per LL-HLS's `_HLS_msn` semantics) until segment `msn` exists
    /// or `timeout` elapses, then returns it if present.
    pub async fn wait_for_segment(&self, msn: u64, timeout: Duration) -> Option<Arc<Segment>> {
        if let Some(s) = self.get_segment(msn) {
            return Some(s);
        }
        let wait = async {
            loop {
                let notified = self.new_segment.notified();
                if let Some(s) = self.get_segment(msn) {
                    return s;
                }
                notified.await;
                if let Some(s) = self.get_segment(msn) {
                    return s;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }

    /// Blocks until segment `msn` has at least `part` parts, per `_HLS_part`.
    pub async fn wait_for_part(&self, msn: u64, part: u32, timeout: Duration) -> Option<Arc<Part>> {
        let lookup = || self.get_segment(msn).and_then(|s| s.parts.get(part as usize).cloned());
        if let Some(p) = lookup() {
            return Some(p);
        }
        let wait = async {
            loop {
                let notified = self.new_part.notified();
                if let Some(p) = lookup() {
                    return p;
                }
                notified.await;
                if let Some(p) = lookup() {
                    return p;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }

    pub fn latest_segment_id(&self) -> Option<u64> {
        self.segments.lock().back().map(|s| s.id)
    }
}

fn pts_delta_ms(start_90khz: u64, now_90khz: u64) -> u32 {
    (now_90khz.saturating_sub(start_90khz) / 90) as u32
}

#[allow(dead_code)]
fn extract_nal_count(data: &[u8], nal_length_size: u8) -> usize {
    split_avcc(data, nal_length_size.clamp(1, 4)).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(keyframe: bool, pts_90khz: u64) -> H264Packet {
        let mut data = Vec::new();
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(&[if keyframe { 0x65 } else { 0x41 }, 0, 0, 0]);
        H264Packet::new(data, keyframe, pts_90khz, pts_90khz)
    }

    #[test]
    fn segment_ids_are_monotonic() {
        let segmenter = HlsSegmenter::new("p1", 2000, 500, false);
        for i in 0..6u64 {
            segmenter.push_packet(packet(true, i * 90_000 * 1)); // ~1s apart, each a keyframe
        }
        let segments = segmenter.segments();
        let ids: Vec<u64> = segments.iter().map(|s| s.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        for w in ids.windows(2) {
            assert_eq!(w[1], w[0] + 1);
        }
    }

    #[test]
    fn ring_evicts_oldest_segment_beyond_capacity() {
        let segmenter = HlsSegmenter::new("p1", 100, 50, false);
        for i in 0..(DEFAULT_RING_CAPACITY as u64 + 5) {
            segmenter.push_packet(packet(true, i * 9_000));
        }
        assert!(segmenter.segments().len() <= DEFAULT_RING_CAPACITY);
    }

    #[tokio::test]
    async fn wait_for_segment_returns_once_it_exists() {
        let segmenter = Arc::new(HlsSegmenter::new("p1", 100, 50, false));
        let waiter = {
            let segmenter = Arc::clone(&segmenter);
            tokio::spawn(async move { segmenter.wait_for_segment(0, Duration::from_secs(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        segmenter.push_packet(packet(true, 0));
        segmenter.push_packet(packet(true, 9_000 * 20));

        let result = waiter.await.unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn wait_for_segment_times_out_when_never_produced() {
        let segmenter = HlsSegmenter::new("p1", 100, 50, false);
        let result = segmenter.wait_for_segment(5, Duration::from_millis(50)).await;
        assert!(result.is_none());
    }

    #[test]
    fn ll_hls_segments_carry_parts() {
        let segmenter = HlsSegmenter::new("p1", 1000, 200, true);
        for i in 0..20u64 {
            segmenter.push_packet(packet(true, i * 9_000));
        }
        let segments = segmenter.segments();
        assert!(segments.iter().any(|s| !s.parts.is_empty()));
    }
}

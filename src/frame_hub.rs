//! FrameHub (spec §4.1, component C1): per-worker latest-frame / H.264
//! packet distribution to fan-out consumers.
//!
//! The latest-YUV and latest-JPEG slots follow the project's structural
//! ancestor's ring-buffer pattern (short-held locks, atomics for stats), cut
//! down to single-slot "latest value" semantics since FrameHub has no
//! preroll requirement. The H.264 broadcast channel is new: each subscriber
//! gets its own bounded queue so the drop-oldest-non-keyframe /
//! never-drop-latest-keyframe policy (spec §4.1) can be enforced precisely,
//! which `tokio::sync::broadcast`'s single shared ring does not allow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::events::{DaemonEvent, EventBus};
use crate::frame::{H264Packet, JpegFrame, ParameterSets, YuvFrame};

const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

pub struct FrameHub {
    printer: String,
    event_bus: Arc<EventBus>,

    latest_yuv: RwLock<Option<YuvFrame>>,
    latest_jpeg: RwLock<Option<JpegFrame>>,
    parameter_sets: RwLock<Option<ParameterSets>>,

    subscribers: Mutex<Vec<Arc<H264SubscriberState>>>,
    sequence: AtomicU64,
}

impl FrameHub {
    pub fn new(printer: impl Into<String>, event_bus: Arc<EventBus>) -> Self {
        Self {
            printer: printer.into(),
            event_bus,
            latest_yuv: RwLock::new(None),
            latest_jpeg: RwLock::new(None),
            parameter_sets: RwLock::new(None),
            subscribers: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    // --- latest-YUV slot --------------------------------------------------

    pub fn publish_yuv(&self, frame: YuvFrame) {
        *self.latest_yuv.write() = Some(frame);
    }

    pub fn latest_yuv(&self) -> Option<YuvFrame> {
        self.latest_yuv.read().clone()
    }

    // --- latest-JPEG slot ---------------------------------------------------

    pub fn publish_jpeg(&self, frame: JpegFrame) {
        *self.latest_jpeg.write() = Some(frame);
    }

    pub fn latest_jpeg(&self) -> Option<JpegFrame> {
        self.latest_jpeg.read().clone()
    }

    /// Reads the latest JPEG, raising `SnapshotRequested` (spec §4.1) if the
    /// slot is empty, then waiting up to `deadline` for one to appear.
    pub async fn snapshot(&self, deadline: Duration) -> Option<JpegFrame> {
        if let Some(frame) = self.latest_jpeg() {
            return Some(frame);
        }

        self.event_bus.publish(DaemonEvent::SnapshotRequested { printer: self.printer.clone() });

        let poll = async {
            loop {
                if let Some(frame) = self.latest_jpeg() {
                    return frame;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        timeout(deadline, poll).await.ok()
    }

    // --- parameter sets ------------------------------------------------------

    pub fn set_parameter_sets(&self, params: ParameterSets) {
        let changed = self.parameter_sets.read().as_ref() != Some(&params);
        *self.parameter_sets.write() = Some(params);
        if changed {
            // Subscribers resend SPS/PPS before the next keyframe (spec §4.2);
            // marking every subscriber not-ready achieves that uniformly.
            for sub in self.subscribers.lock().iter() {
                sub.queue.lock().ready = false;
            }
        }
    }

    pub fn parameter_sets(&self) -> Option<ParameterSets> {
        self.parameter_sets.read().clone()
    }

    // --- H.264 broadcast -----------------------------------------------------

    pub fn subscribe_h264(&self) -> H264Subscription {
        let state = Arc::new(H264SubscriberState {
            queue: Mutex::new(SubscriberQueue {
                packets: VecDeque::new(),
                capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
                ready: false,
            }),
            notify: Notify::new(),
        });
        self.subscribers.lock().push(Arc::clone(&state));
        H264Subscription { state }
    }

    pub fn publish_h264(&self, packet: H264Packet) {
        let subscribers = self.subscribers.lock();
        for sub in subscribers.iter() {
            let mut queue = sub.queue.lock();
            if !queue.ready {
                if packet.is_keyframe {
                    queue.ready = true;
                    queue.push(packet.clone());
                }
                // non-keyframe packets before first keyframe are discarded.
                continue;
            }
            queue.push(packet.clone());
            drop(queue);
            sub.notify.notify_waiters();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drops subscribers whose channel has no more readers. Call
    /// periodically (e.g. from the JPEG-encoder tick) to bound memory.
    pub fn reap_closed_subscribers(&self) {
        self.subscribers.lock().retain(|s| Arc::strong_count(s) > 1);
    }
}

struct SubscriberQueue {
    packets: VecDeque<H264Packet>,
    capacity: usize,
    ready: bool,
}

impl SubscriberQueue {
    /// Pushes a packet, then if over capacity evicts the oldest
    /// *non-keyframe* packet; if every queued packet is a keyframe (rare),
    /// falls back to evicting the oldest entry, since the invariant that
    /// must never be violated is "never drop the most recent keyframe", not
    /// "never drop any keyframe".
    fn push(&mut self, packet: H264Packet) {
        self.packets.push_back(packet);
        while self.packets.len() > self.capacity {
            if let Some(idx) = self.packets.iter().position(|p| !p.is_keyframe) {
                self.packets.remove(idx);
            } else {
                self.packets.pop_front();
            }
        }
    }
}

struct H264SubscriberState {
    queue: Mutex<SubscriberQueue>,
    notify: Notify,
}

pub struct H264Subscription {
    state: Arc<H264SubscriberState>,
}

impl H264Subscription {
    /// Awaits the next packet for this subscriber, preserving source order.
    pub async fn recv(&self) -> H264Packet {
        loop {
            if let Some(packet) = self.state.queue.lock().packets.pop_front() {
                return packet;
            }
            self.state.notify.notified().await;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.queue.lock().ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> FrameHub {
        FrameHub::new("k1", Arc::new(EventBus::new()))
    }

    fn packet(keyframe: bool, seq: u64) -> H264Packet {
        H264Packet::new(vec![0u8; 4], keyframe, seq * 100, seq)
    }

    #[tokio::test]
    async fn late_subscriber_discards_frames_before_first_keyframe() {
        let hub = hub();
        let sub = hub.subscribe_h264();

        hub.publish_h264(packet(false, 0));
        hub.publish_h264(packet(false, 1));
        assert!(!sub.is_ready());

        hub.publish_h264(packet(true, 2));
        assert!(sub.is_ready());

        let received = sub.recv().await;
        assert!(received.is_keyframe);
        assert_eq!(received.sequence, 2);
    }

    #[tokio::test]
    async fn packets_preserve_source_order() {
        let hub = hub();
        let sub = hub.subscribe_h264();
        hub.publish_h264(packet(true, 0));
        hub.publish_h264(packet(false, 1));
        hub.publish_h264(packet(false, 2));

        assert_eq!(sub.recv().await.sequence, 0);
        assert_eq!(sub.recv().await.sequence, 1);
        assert_eq!(sub.recv().await.sequence, 2);
    }

    #[test]
    fn overflow_drops_oldest_non_keyframe_not_latest_keyframe() {
        let mut queue = SubscriberQueue { packets: VecDeque::new(), capacity: 2, ready: true };
        queue.push(packet(true, 0));
        queue.push(packet(false, 1));
        queue.push(packet(false, 2)); // over capacity: evict the non-keyframe at seq 1

        let seqs: Vec<u64> = queue.packets.iter().map(|p| p.sequence).collect();
        assert_eq!(seqs, vec![0, 2]);
    }

    #[tokio::test]
    async fn snapshot_returns_cached_jpeg_without_raising_event() {
        let hub = hub();
        hub.publish_jpeg(JpegFrame::new(vec![0xFF, 0xD8], 100, 100, 1));
        let mut rx = hub.event_bus.subscribe();

        let snap = hub.snapshot(Duration::from_millis(100)).await;
        assert!(snap.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_raises_requested_event_when_empty() {
        let hub = hub();
        let mut rx = hub.event_bus.subscribe();

        let snap = hub.snapshot(Duration::from_millis(50)).await;
        assert!(snap.is_none());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "snapshot_requested");
    }
}

//! Per-type client counters (spec §4.2: "client counts are counted by type
//! (mjpeg, h264-ws, external/janus) and visible to the worker so it can
//! drive keepalive"). Each accepted connection holds a [`ClientGuard`] for
//! its lifetime; the count decrements automatically on drop/disconnect.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct ClientCounts {
    mjpeg: AtomicUsize,
    h264_ws: AtomicUsize,
    external: AtomicUsize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientKind {
    Mjpeg,
    H264Ws,
    External,
}

impl ClientCounts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquire(self: &Arc<Self>, kind: ClientKind) -> ClientGuard {
        self.counter(kind).fetch_add(1, Ordering::SeqCst);
        ClientGuard { counts: Arc::clone(self), kind }
    }

    pub fn total(&self) -> usize {
        self.mjpeg.load(Ordering::SeqCst) + self.h264_ws.load(Ordering::SeqCst) + self.external.load(Ordering::SeqCst)
    }

    pub fn mjpeg(&self) -> usize {
        self.mjpeg.load(Ordering::SeqCst)
    }

    pub fn h264_ws(&self) -> usize {
        self.h264_ws.load(Ordering::SeqCst)
    }

    pub fn external(&self) -> usize {
        self.external.load(Ordering::SeqCst)
    }

    fn counter(&self, kind: ClientKind) -> &AtomicUsize {
        match kind {
            ClientKind::Mjpeg => &self.mjpeg,
            ClientKind::H264Ws => &self.h264_ws,
            ClientKind::External => &self.external,
        }
    }
}

pub struct ClientGuard {
    counts: Arc<ClientCounts>,
    kind: ClientKind,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.counts.counter(self.kind).fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_increments_then_decrements_on_drop() {
        let counts = ClientCounts::new();
        assert_eq!(counts.total(), 0);
        {
            let _g = counts.acquire(ClientKind::Mjpeg);
            assert_eq!(counts.mjpeg(), 1);
        }
        assert_eq!(counts.total(), 0);
    }

    #[test]
    fn counts_are_independent_per_kind() {
        let counts = ClientCounts::new();
        let _a = counts.acquire(ClientKind::Mjpeg);
        let _b = counts.acquire(ClientKind::H264Ws);
        let _c = counts.acquire(ClientKind::External);
        assert_eq!(counts.mjpeg(), 1);
        assert_eq!(counts.h264_ws(), 1);
        assert_eq!(counts.external(), 1);
        assert_eq!(counts.total(), 3);
    }
}

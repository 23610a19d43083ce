//! The subset of `WorkerStatus` (spec §3) the MjpegServer needs to answer
//! `GET /status` without depending on the worker module directly -- the
//! worker pushes updates into this shared cell, the server only reads it.

use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub printer: String,
    pub state: String,
    pub current_fps: u32,
    pub model_code: Option<String>,
    pub last_frame_at_ms: Option<u128>,
    pub consecutive_failures: u32,
}

impl StatusView {
    pub fn initial(printer: impl Into<String>) -> Self {
        Self {
            printer: printer.into(),
            state: "stopped".to_string(),
            current_fps: 0,
            model_code: None,
            last_frame_at_ms: None,
            consecutive_failures: 0,
        }
    }
}

pub struct StatusCell(RwLock<StatusView>);

impl StatusCell {
    pub fn new(initial: StatusView) -> Self {
        Self(RwLock::new(initial))
    }

    pub fn get(&self) -> StatusView {
        self.0.read().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut StatusView)) {
        f(&mut self.0.write());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_mutates_in_place() {
        let cell = StatusCell::new(StatusView::initial("k1"));
        cell.update(|s| s.current_fps = 15);
        assert_eq!(cell.get().current_fps, 15);
    }
}

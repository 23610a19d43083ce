//! WorkerStatus (spec §3): the transient, per-worker snapshot returned by
//! `GetPrinterDetails`/`ListPrinters` (spec §6). Readers get an owned copy
//! produced under a short lock, matching the "shared mutable status structs
//! -> immutable snapshot" guidance in spec §9.

use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Initializing,
    Connecting,
    Running,
    Retrying,
    Paused,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Initializing => "initializing",
            WorkerState::Connecting => "connecting",
            WorkerState::Running => "running",
            WorkerState::Retrying => "retrying",
            WorkerState::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SshSubstatus {
    pub connected: bool,
    pub last_attempt_at_ms: Option<u128>,
    pub credentials_retrieved: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MqttSubstatus {
    pub connected: bool,
    pub last_attempt_at_ms: Option<u128>,
    pub model_code: Option<String>,
    pub camera_started: bool,
    pub printer_state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamSubstatus {
    pub connected: bool,
    pub decoded_frame_count: u64,
    pub current_width: Option<u32>,
    pub current_height: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedStatus {
    pub on: bool,
    pub brightness: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub state: WorkerState,
    pub is_paused: bool,
    pub last_error: Option<String>,
    pub last_error_at_ms: Option<u128>,
    pub last_seen_online_ms: Option<u128>,
    pub next_retry_at_ms: Option<u128>,
    pub ssh: SshSubstatus,
    pub mqtt: MqttSubstatus,
    pub stream: StreamSubstatus,
    pub led: Option<LedStatus>,
    pub current_fps: u32,
    pub client_count: usize,
}

impl WorkerStatus {
    pub fn initial(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: WorkerState::Stopped,
            is_paused: false,
            last_error: None,
            last_error_at_ms: None,
            last_seen_online_ms: None,
            next_retry_at_ms: None,
            ssh: SshSubstatus::default(),
            mqtt: MqttSubstatus::default(),
            stream: StreamSubstatus::default(),
            led: None,
            current_fps: 0,
            client_count: 0,
        }
    }
}

pub fn now_millis() -> u128 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_millis()
}

/// A short-lock-guarded cell holding the latest `WorkerStatus` snapshot;
/// readers across tasks get an owned clone (spec §5 "worker status fields
/// read across tasks").
pub struct WorkerStatusCell(RwLock<WorkerStatus>);

impl WorkerStatusCell {
    pub fn new(initial: WorkerStatus) -> Self {
        Self(RwLock::new(initial))
    }

    pub fn get(&self) -> WorkerStatus {
        self.0.read().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut WorkerStatus)) {
        f(&mut self.0.write());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_status_is_stopped() {
        let cell = WorkerStatusCell::new(WorkerStatus::initial("k1"));
        assert_eq!(cell.get().state, WorkerState::Stopped);
    }

    #[test]
    fn update_mutates_in_place() {
        let cell = WorkerStatusCell::new(WorkerStatus::initial("k1"));
        cell.update(|s| s.state = WorkerState::Running);
        assert_eq!(cell.get().state, WorkerState::Running);
    }
}

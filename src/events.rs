#![allow(dead_code)]
//! Daemon-wide event bus and log throttling.
//!
//! The broadcast-channel event bus is carried over from the project's
//! structural ancestor almost verbatim (`EventBus` wrapping
//! `tokio::sync::broadcast`), re-keyed to this daemon's event variants
//! (spec §4.3/§4.5/§4.6 event names: `ModelCodeDetected`, `CameraStopDetected`,
//! `ConfigChanged`, ...). `LogThrottle` is new: it implements testable
//! property 9 (log throttling with reset-on-recovery).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum DaemonEvent {
    /// MqttController observed the printer's model code (spec §4.3).
    ModelCodeDetected { printer: String, model_code: String },
    /// MqttController's LED query/set correlation resolved.
    LedStatusReceived { printer: String, on: bool, brightness: Option<u32> },
    /// MqttController observed a printer state/temperature update.
    PrinterStateReceived { printer: String, state: String },
    /// An external agent stopped the camera out from under the worker (spec §4.3/§4.7).
    CameraStopDetected { printer: String },
    /// FrameHub's JPEG slot was empty on a snapshot request (spec §4.1).
    SnapshotRequested { printer: String },
    /// SSH bootstrap rewrote credentials/model/type; registry must persist (spec §4.5 step 1).
    ConfigChanged { printer: String },
    /// A worker transitioned between states (spec §4.5 state machine).
    WorkerStateChanged { printer: String, state: String },
    /// Obico issued a cancel; the worker must also send the native MQTT stop (spec §4.8).
    ObicoCancelRequested { printer: String },
    /// Non-fatal component error surfaced for status/telemetry purposes.
    ComponentError { printer: String, component: String, message: String },
    ShutdownRequested { reason: String },
}

impl DaemonEvent {
    pub fn printer(&self) -> Option<&str> {
        match self {
            DaemonEvent::ModelCodeDetected { printer, .. }
            | DaemonEvent::LedStatusReceived { printer, .. }
            | DaemonEvent::PrinterStateReceived { printer, .. }
            | DaemonEvent::CameraStopDetected { printer }
            | DaemonEvent::SnapshotRequested { printer }
            | DaemonEvent::ConfigChanged { printer }
            | DaemonEvent::WorkerStateChanged { printer, .. }
            | DaemonEvent::ObicoCancelRequested { printer }
            | DaemonEvent::ComponentError { printer, .. } => Some(printer),
            DaemonEvent::ShutdownRequested { .. } => None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            DaemonEvent::ModelCodeDetected { .. } => "model_code_detected",
            DaemonEvent::LedStatusReceived { .. } => "led_status_received",
            DaemonEvent::PrinterStateReceived { .. } => "printer_state_received",
            DaemonEvent::CameraStopDetected { .. } => "camera_stop_detected",
            DaemonEvent::SnapshotRequested { .. } => "snapshot_requested",
            DaemonEvent::ConfigChanged { .. } => "config_changed",
            DaemonEvent::WorkerStateChanged { .. } => "worker_state_changed",
            DaemonEvent::ObicoCancelRequested { .. } => "obico_cancel_requested",
            DaemonEvent::ComponentError { .. } => "component_error",
            DaemonEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast hub shared by every worker and the daemon root.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DaemonEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DaemonEvent) {
        match &event {
            DaemonEvent::ComponentError { .. } => warn!(event = event.event_type(), ?event, "component error"),
            DaemonEvent::CameraStopDetected { .. } | DaemonEvent::ConfigChanged { .. } => {
                info!(event = event.event_type(), ?event, "event")
            }
            _ => debug!(event = event.event_type(), ?event, "event"),
        }
        // A publish with no subscribers is not an error; it just means
        // nothing is currently listening, matching doorcam's EventBus.
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Deduplicates repeated log emissions under the same `(component, key)`
/// within a throttle window (testable property 9). A successful reconnect
/// calls `reset` so the next failure logs immediately rather than waiting
/// out a stale window.
pub struct LogThrottle {
    window: Duration,
    last_emitted: Mutex<HashMap<(String, String), Instant>>,
}

impl LogThrottle {
    pub fn new(window: Duration) -> Arc<Self> {
        Arc::new(Self { window, last_emitted: Mutex::new(HashMap::new()) })
    }

    /// Returns `true` if the caller should actually emit the log line.
    pub fn should_emit(&self, component: &str, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.last_emitted.lock();
        let entry_key = (component.to_string(), key.to_string());
        match map.get(&entry_key) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                map.insert(entry_key, now);
                true
            }
        }
    }

    pub fn reset(&self, component: &str, key: &str) {
        self.last_emitted.lock().remove(&(component.to_string(), key.to_string()));
    }

    pub fn reset_component(&self, component: &str) {
        self.last_emitted.lock().retain(|(c, _), _| c != component);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_fans_out_to_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(DaemonEvent::CameraStopDetected { printer: "k1".into() });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type(), "camera_stop_detected");
        assert_eq!(e2.event_type(), "camera_stop_detected");
    }

    #[test]
    fn throttle_suppresses_repeats_within_window() {
        let throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_emit("mqtt", "connect-refused"));
        assert!(!throttle.should_emit("mqtt", "connect-refused"));
    }

    #[test]
    fn throttle_reset_reenables_immediate_emission() {
        let throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_emit("mqtt", "connect-refused"));
        throttle.reset("mqtt", "connect-refused");
        assert!(throttle.should_emit("mqtt", "connect-refused"));
    }

    #[test]
    fn throttle_keys_are_independent_per_component() {
        let throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_emit("mqtt", "refused"));
        assert!(throttle.should_emit("ssh", "refused"));
    }
}

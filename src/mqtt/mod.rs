//! MQTT camera control channel (spec §4.3, §4.7, component C3).

mod commands;
mod controller;
mod topics;

pub use commands::{CameraOp, LedOp};
pub use controller::MqttController;

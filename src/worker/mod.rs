//! Per-printer supervision (spec §4.5, component C5): one `PrinterWorker`
//! task per configured printer, plus its collaborators.

pub mod decoder;
pub mod jpeg;
pub mod led_control;
pub mod reachability;
pub mod status;
pub mod worker;

pub use decoder::{DecoderEvent, DecoderHandle, FfmpegDecoder};
pub use led_control::MqttLedControl;
pub use status::{WorkerState, WorkerStatus, WorkerStatusCell};
pub use worker::PrinterWorkerHandle;

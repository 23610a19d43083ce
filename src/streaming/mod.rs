mod client_counts;
mod handlers;
mod server;
mod status;

pub use client_counts::{ClientCounts, ClientGuard, ClientKind};
pub use server::{LedControl, MjpegServer, MjpegServerBuilder, ServerState};
pub use status::{StatusCell, StatusView};

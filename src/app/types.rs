/// Component lifecycle states, tracked for `GetStatus`/log context.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Daemon shutdown reason (spec §6 `StopService`, SIGTERM/SIGINT).
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    IpcRequest,
    Fatal(String),
}

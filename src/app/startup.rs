use super::types::ComponentState;
use super::Daemon;
use crate::error::Result;
use tracing::info;

impl Daemon {
    /// Registers tracked components in their initial state. Workers are
    /// already running at this point (`PrinterRegistry::start` spawns them
    /// eagerly); this only concerns the daemon-level IPC surface.
    pub async fn initialize(&mut self) -> Result<()> {
        let mut states = self.component_states.lock().await;
        states.insert("registry".to_string(), ComponentState::Running);
        states.insert("ipc".to_string(), ComponentState::Stopped);
        Ok(())
    }

    /// Starts the IPC listener and, if requested, notifies systemd that the
    /// daemon is ready.
    pub async fn start(&mut self) -> Result<()> {
        self.set_component_state("ipc", ComponentState::Starting).await;

        let ipc = std::sync::Arc::clone(&self.ipc);
        let cancel = self.cancellation_token.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc.serve(cancel).await {
                tracing::error!(error = %e, "ipc server exited");
            }
        });

        self.set_component_state("ipc", ComponentState::Running).await;

        if self.notify_systemd {
            super::systemd::notify_ready();
        }

        info!("acproxycam daemon started");
        Ok(())
    }
}

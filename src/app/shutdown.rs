use super::types::ComponentState;
use super::Daemon;
use crate::error::Result;
use tracing::info;

impl Daemon {
    /// Cancels every worker and tears down the IPC listener (spec §5 "the
    /// daemon cancels all workers, each worker awaits its subtasks up to a
    /// 5 s grace").
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("beginning graceful shutdown");
        self.cancellation_token.cancel();

        self.set_component_state("registry", ComponentState::Stopping).await;
        self.registry.shutdown_all().await;
        self.set_component_state("registry", ComponentState::Stopped).await;

        self.set_component_state("ipc", ComponentState::Stopped).await;

        info!("graceful shutdown complete");
        Ok(0)
    }
}

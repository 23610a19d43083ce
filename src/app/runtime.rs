use super::{Daemon, ShutdownReason};
use crate::error::{AcproxycamError, Result};
use crate::events::DaemonEvent;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::info;

impl Daemon {
    /// Waits for a shutdown trigger (signal, or `StopService` via IPC) and
    /// then runs graceful shutdown.
    pub async fn run(&mut self) -> Result<i32> {
        info!("acproxycam daemon is running");

        let shutdown_sender = self.shutdown_sender.take().ok_or_else(|| AcproxycamError::system("shutdown sender already taken"))?;
        let shutdown_receiver = self.shutdown_receiver.take().ok_or_else(|| AcproxycamError::system("shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender).await;

        let reason = shutdown_receiver.await.map_err(|_| AcproxycamError::system("shutdown channel closed unexpectedly"))?;
        info!(?reason, "shutdown initiated");

        let exit_code = self.shutdown().await?;
        info!(exit_code, "acproxycam daemon shutdown complete");
        Ok(exit_code)
    }

    /// Only one of signal handling / IPC `StopService` ever actually fires
    /// the oneshot; the `Arc<Mutex<Option<_>>>` wrapper lets either win.
    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        #[cfg(unix)]
        {
            let sender = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                if let Some(()) = signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to register SIGTERM handler").recv().await {
                    info!("received SIGTERM");
                    if let Some(sender) = sender.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        let sender = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received SIGINT");
                if let Some(sender) = sender.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });

        let sender = Arc::clone(&shutdown_sender);
        let mut event_rx = self.event_bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = event_rx.recv().await {
                if let DaemonEvent::ShutdownRequested { .. } = event {
                    info!("shutdown requested over ipc");
                    if let Some(sender) = sender.lock().await.take() {
                        let _ = sender.send(ShutdownReason::IpcRequest);
                    }
                    break;
                }
            }
        });
    }
}

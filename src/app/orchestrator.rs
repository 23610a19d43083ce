use super::types::ComponentState;
use crate::config::DaemonConfig;
use crate::crypto::CredentialCipher;
use crate::error::Result;
use crate::events::EventBus;
use crate::ipc::IpcServer;
use crate::registry::PrinterRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use super::types::ShutdownReason;

/// Daemon root (spec §2 C9): owns the event bus, the printer registry, and
/// the IPC server, and coordinates their startup/shutdown lifecycle.
pub struct Daemon {
    pub(super) event_bus: Arc<EventBus>,
    pub(super) registry: Arc<PrinterRegistry>,
    pub(super) ipc: Arc<IpcServer>,

    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) notify_systemd: bool,
}

impl Daemon {
    /// Loads credentials, spawns a worker for every configured printer, and
    /// wires up the IPC server (not yet listening).
    pub async fn new(mut config: DaemonConfig, config_path: String, notify_systemd: bool) -> Result<Self> {
        let cipher = CredentialCipher::from_machine_id()?;
        config.decrypt_credentials(&cipher)?;

        let event_bus = Arc::new(EventBus::new());
        let registry = Arc::new(PrinterRegistry::start(config.clone(), config_path, cipher, Arc::clone(&event_bus)));
        let ipc = Arc::new(IpcServer::new(config.ipc_socket_path.clone(), Arc::clone(&registry), Arc::clone(&event_bus)));

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            event_bus,
            registry,
            ipc,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            notify_systemd,
        })
    }
}

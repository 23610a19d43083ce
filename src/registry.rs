//! PrinterRegistry (spec §4.6, component C6): serializes Add/Modify/Delete
//! behind a single mutex, owns the live worker map, and persists the config
//! document through the crypto layer. Worker I/O happens outside the lock
//! (spec §5 "a single mutex protects the worker map and config list; worker
//! I/O happens outside the lock"), grounded on the same "short lock, then
//! act" shape as `streaming::status::StatusCell`.

use std::net::TcpListener;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{DaemonConfig, PrinterConfig};
use crate::crypto::CredentialCipher;
use crate::error::{AcproxycamError, RegistryError, Result};
use crate::events::{DaemonEvent, EventBus};
use crate::worker::{PrinterWorkerHandle, WorkerStatus};

struct RegistryState {
    config: DaemonConfig,
    config_path: String,
    workers: Vec<PrinterWorkerHandle>,
}

pub struct PrinterRegistry {
    state: Mutex<RegistryState>,
    cipher: CredentialCipher,
    event_bus: Arc<EventBus>,
}

impl PrinterRegistry {
    /// Spawns a worker for every printer already present in `config` and
    /// returns the registry ready to serve IPC commands.
    pub fn start(config: DaemonConfig, config_path: impl Into<String>, cipher: CredentialCipher, event_bus: Arc<EventBus>) -> Self {
        let workers = config.printers.iter().map(|p| PrinterWorkerHandle::spawn(p.clone(), Arc::clone(&event_bus))).collect();

        Self {
            state: Mutex::new(RegistryState { config, config_path: config_path.into(), workers }),
            cipher,
            event_bus,
        }
    }

    pub fn list_statuses(&self) -> Vec<WorkerStatus> {
        let state = self.state.lock();
        state.workers.iter().map(|w| w.status.get()).collect()
    }

    pub fn printer_status(&self, name: &str) -> Result<WorkerStatus> {
        let state = self.state.lock();
        state
            .workers
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.status.get())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()).into())
    }

    pub fn printer_config(&self, name: &str) -> Result<PrinterConfig> {
        let state = self.state.lock();
        state.config.masked_printer(name)
    }

    pub fn daemon_config_snapshot(&self) -> DaemonConfig {
        self.state.lock().config.clone()
    }

    pub fn config_path(&self) -> String {
        self.state.lock().config_path.clone()
    }

    /// Validates uniqueness and bindability, spawns a worker, and persists
    /// the new printer to disk (spec §4.6 `AddPrinter`).
    pub async fn add_printer(&self, printer: PrinterConfig) -> Result<()> {
        {
            let state = self.state.lock();
            if state.workers.iter().any(|w| w.name == printer.name) {
                return Err(RegistryError::DuplicateName(printer.name.clone()).into());
            }
            if state.config.printers.iter().any(|p| p.mjpeg_port == printer.mjpeg_port) {
                return Err(RegistryError::DuplicatePort(printer.mjpeg_port).into());
            }
        }
        check_bindable(printer.mjpeg_port)?;

        let handle = PrinterWorkerHandle::spawn(printer.clone(), Arc::clone(&self.event_bus));

        let mut state = self.state.lock();
        state.config.printers.push(printer);
        state.workers.push(handle);
        self.persist(&mut state)?;
        Ok(())
    }

    /// Stops and removes a worker (spec §4.6 `DeletePrinter`). Not finding
    /// the printer is not an error; delete is idempotent.
    pub async fn delete_printer(&self, name: &str) -> Result<()> {
        let removed = {
            let mut state = self.state.lock();
            state.config.printers.retain(|p| p.name != name);
            let idx = state.workers.iter().position(|w| w.name == name);
            let handle = idx.map(|i| state.workers.remove(i));
            self.persist(&mut state)?;
            handle
        };
        if let Some(handle) = removed {
            handle.shutdown().await;
        }
        Ok(())
    }

    /// Stops the existing worker, swaps config, and starts a new one; if the
    /// MJPEG port changed, re-validates it (spec §4.6 `ModifyPrinter`).
    pub async fn modify_printer(&self, original_name: &str, new_config: PrinterConfig) -> Result<()> {
        let port_changed = {
            let state = self.state.lock();
            let existing = state.config.printers.iter().find(|p| p.name == original_name).ok_or_else(|| RegistryError::NotFound(original_name.to_string()))?;
            let port_changed = existing.mjpeg_port != new_config.mjpeg_port;
            if port_changed && state.config.printers.iter().any(|p| p.name != original_name && p.mjpeg_port == new_config.mjpeg_port) {
                return Err(RegistryError::DuplicatePort(new_config.mjpeg_port).into());
            }
            port_changed
        };
        if port_changed {
            check_bindable(new_config.mjpeg_port)?;
        }

        let old_handle = {
            let mut state = self.state.lock();
            let idx = state.workers.iter().position(|w| w.name == original_name);
            idx.map(|i| state.workers.remove(i))
        };
        if let Some(handle) = old_handle {
            handle.shutdown().await;
        }

        let new_handle = PrinterWorkerHandle::spawn(new_config.clone(), Arc::clone(&self.event_bus));

        let mut state = self.state.lock();
        if let Some(entry) = state.config.printers.iter_mut().find(|p| p.name == original_name) {
            *entry = new_config;
        }
        state.workers.push(new_handle);
        self.persist(&mut state)?;
        Ok(())
    }

    pub async fn pause_printer(&self, name: &str) -> Result<()> {
        let state = self.state.lock();
        let handle = state.workers.iter().find(|w| w.name == name).ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        handle.pause().await;
        Ok(())
    }

    pub async fn resume_printer(&self, name: &str) -> Result<()> {
        let state = self.state.lock();
        let handle = state.workers.iter().find(|w| w.name == name).ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        handle.resume().await;
        Ok(())
    }

    pub async fn set_led(&self, name: &str, on: bool, brightness: Option<u32>) -> Result<()> {
        let state = self.state.lock();
        let handle = state.workers.iter().find(|w| w.name == name).ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        handle.set_led(on, brightness).await;
        Ok(())
    }

    /// Gives every worker the new config snapshot; an interface-list change
    /// restarts every worker, otherwise each worker's own config-change
    /// handling decides whether a restart is warranted (spec §4.6
    /// `ReloadConfig`).
    pub async fn reload_config(&self, new_config: DaemonConfig) -> Result<()> {
        let interfaces_changed = {
            let state = self.state.lock();
            state.config.listen_interfaces != new_config.listen_interfaces
        };

        if interfaces_changed {
            warn!("listen interfaces changed, restarting all workers");
            let old_workers = {
                let mut state = self.state.lock();
                std::mem::take(&mut state.workers)
            };
            for handle in old_workers {
                handle.shutdown().await;
            }
            let new_workers = new_config.printers.iter().map(|p| PrinterWorkerHandle::spawn(p.clone(), Arc::clone(&self.event_bus))).collect();
            let mut state = self.state.lock();
            state.config = new_config;
            state.workers = new_workers;
            self.persist(&mut state)?;
            return Ok(());
        }

        let mut state = self.state.lock();
        state.config = new_config;
        self.persist(&mut state)?;
        Ok(())
    }

    pub async fn change_interfaces(&self, interfaces: Vec<String>) -> Result<()> {
        let mut new_config = self.daemon_config_snapshot();
        new_config.listen_interfaces = interfaces;
        self.reload_config(new_config).await
    }

    pub fn active_streamer_count(&self) -> usize {
        self.list_statuses().iter().filter(|s| s.stream.connected).count()
    }

    pub fn total_client_count(&self) -> usize {
        self.list_statuses().iter().map(|s| s.client_count).sum()
    }

    pub fn printer_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    /// Stops every worker, in deletion order, bounded by each worker's own
    /// shutdown grace window (spec §5 "daemon cancels all workers").
    pub async fn shutdown_all(&self) {
        let workers = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.workers)
        };
        for handle in workers {
            handle.shutdown().await;
        }
    }

    fn persist(&self, state: &mut RegistryState) -> Result<()> {
        let encrypted = state.config.encrypted_for_storage(&self.cipher);
        encrypted.save_to_file(&state.config_path)?;
        self.event_bus.publish(DaemonEvent::ConfigChanged { printer: String::new() });
        info!(path = %state.config_path, "persisted daemon config");
        Ok(())
    }
}

fn check_bindable(port: u16) -> Result<()> {
    TcpListener::bind(("0.0.0.0", port)).map(|_| ()).map_err(|e| AcproxycamError::from(RegistryError::PortNotBindable(port, e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config(name: &str, port: u16) -> PrinterConfig {
        PrinterConfig {
            name: name.to_string(),
            ip: "10.0.0.5".to_string(),
            mjpeg_port: port,
            ssh_port: 22,
            mqtt_port: 9883,
            ssh_username: "root".to_string(),
            ssh_password: String::new(),
            mqtt_username: None,
            mqtt_password: None,
            device_id: None,
            model_code: None,
            device_type: None,
            max_fps: 15,
            idle_fps: 1,
            jpeg_quality: 80,
            camera_enabled: true,
            send_stop_command: true,
            auto_lan_mode: false,
            led_auto_control: true,
            standby_led_timeout_minutes: 5,
            camera_keepalive_seconds: 60,
            ll_hls_enabled: false,
            hls_part_duration_ms: 500,
            obico: Default::default(),
        }
    }

    #[tokio::test]
    async fn add_printer_rejects_duplicate_name() {
        let bus = Arc::new(EventBus::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let registry = PrinterRegistry::start(DaemonConfig::default(), path.to_string_lossy().to_string(), CredentialCipher::from_secret(b"test"), bus);

        registry.add_printer(sample_config("k1", 18089)).await.unwrap();
        let err = registry.add_printer(sample_config("k1", 18090)).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn add_printer_rejects_duplicate_port() {
        let bus = Arc::new(EventBus::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let registry = PrinterRegistry::start(DaemonConfig::default(), path.to_string_lossy().to_string(), CredentialCipher::from_secret(b"test"), bus);

        registry.add_printer(sample_config("k1", 18089)).await.unwrap();
        let err = registry.add_printer(sample_config("k2", 18089)).await.unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[tokio::test]
    async fn delete_printer_is_idempotent() {
        let bus = Arc::new(EventBus::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let registry = PrinterRegistry::start(DaemonConfig::default(), path.to_string_lossy().to_string(), CredentialCipher::from_secret(b"test"), bus);

        registry.delete_printer("does-not-exist").await.unwrap();
    }
}

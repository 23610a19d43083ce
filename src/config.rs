#![allow(dead_code)]
//! Configuration model and loader (spec §3 PrinterConfig/ObicoConfig, §6 config file).
//!
//! Loaded the way the project's structural ancestor loads its config: a
//! `config::Config::builder()` chain of `.set_default()` calls for every
//! scalar field, a `File` source pointed at the on-disk document, and an
//! `Environment` source with an `ACPROXYCAM_` prefix. Credential fields are
//! opaque strings at this layer -- `crypto.rs` is responsible for turning the
//! `encrypted:` sentinel into plaintext and back; this module only knows the
//! shape of the document.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::crypto::CredentialCipher;
use crate::error::{AcproxycamError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_listen_interfaces")]
    pub listen_interfaces: Vec<String>,
    #[serde(default = "default_ipc_socket_path")]
    pub ipc_socket_path: String,
    #[serde(default)]
    pub printers: Vec<PrinterConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            listen_interfaces: default_listen_interfaces(),
            ipc_socket_path: default_ipc_socket_path(),
            printers: Vec::new(),
        }
    }
}

fn default_version() -> u32 {
    1
}
fn default_listen_interfaces() -> Vec<String> {
    vec!["0.0.0.0".to_string()]
}
fn default_ipc_socket_path() -> String {
    "/run/acproxycam/acproxycam.sock".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub name: String,
    pub ip: String,

    pub mjpeg_port: u16,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    #[serde(default)]
    pub ssh_username: String,
    #[serde(default)]
    pub ssh_password: String,

    #[serde(default)]
    pub mqtt_username: Option<String>,
    #[serde(default)]
    pub mqtt_password: Option<String>,

    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub model_code: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,

    #[serde(default = "default_max_fps")]
    pub max_fps: u32,
    #[serde(default = "default_idle_fps")]
    pub idle_fps: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_true")]
    pub camera_enabled: bool,
    #[serde(default = "default_true")]
    pub send_stop_command: bool,
    #[serde(default)]
    pub auto_lan_mode: bool,
    #[serde(default = "default_true")]
    pub led_auto_control: bool,
    #[serde(default = "default_standby_led_timeout_minutes")]
    pub standby_led_timeout_minutes: u32,
    #[serde(default = "default_camera_keepalive_seconds")]
    pub camera_keepalive_seconds: u64,

    #[serde(default)]
    pub ll_hls_enabled: bool,
    #[serde(default = "default_hls_part_duration_ms")]
    pub hls_part_duration_ms: u64,

    #[serde(default)]
    pub obico: ObicoConfig,
}

fn default_ssh_port() -> u16 {
    22
}
fn default_mqtt_port() -> u16 {
    9883
}
fn default_max_fps() -> u32 {
    15
}
fn default_idle_fps() -> u32 {
    1
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_true() -> bool {
    true
}
fn default_standby_led_timeout_minutes() -> u32 {
    5
}
fn default_camera_keepalive_seconds() -> u64 {
    60
}
fn default_hls_part_duration_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObicoStreamMode {
    Mjpeg,
    H264,
}

impl Default for ObicoStreamMode {
    fn default() -> Self {
        ObicoStreamMode::Mjpeg
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObicoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub device_secret: String,
    #[serde(default)]
    pub obico_device_id: Option<String>,
    #[serde(default)]
    pub obico_printer_id: Option<String>,
    #[serde(default)]
    pub is_pro: bool,
    #[serde(default)]
    pub stream_mode: ObicoStreamMode,
    #[serde(default)]
    pub janus_server: Option<String>,
    #[serde(default = "default_true")]
    pub snapshots_enabled: bool,
}

impl Default for ObicoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: String::new(),
            auth_token: String::new(),
            device_secret: String::new(),
            obico_device_id: None,
            obico_printer_id: None,
            is_pro: false,
            stream_mode: ObicoStreamMode::Mjpeg,
            janus_server: None,
            snapshots_enabled: true,
        }
    }
}

impl DaemonConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_file("/etc/acproxycam/config.json")
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        let builder = Config::builder()
            .set_default("version", default_version())?
            .set_default("listen_interfaces", default_listen_interfaces())?
            .set_default("ipc_socket_path", default_ipc_socket_path())?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("ACPROXYCAM").separator("_"));

        let config: DaemonConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
            }
        }

        std::fs::write(path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Structural validation only -- port-uniqueness across the live worker
    /// set is PrinterRegistry's job (spec §4.6), not the config loader's.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut seen_names = std::collections::HashSet::new();
        let mut seen_ports = std::collections::HashSet::new();

        for printer in &self.printers {
            if printer.name.is_empty() {
                return Err(ConfigError::Message("printer name must not be empty".into()));
            }
            if !seen_names.insert(printer.name.clone()) {
                return Err(ConfigError::Message(format!(
                    "duplicate printer name: {}",
                    printer.name
                )));
            }
            if !seen_ports.insert(printer.mjpeg_port) {
                return Err(ConfigError::Message(format!(
                    "duplicate mjpeg port: {}",
                    printer.mjpeg_port
                )));
            }
            if printer.max_fps == 0 {
                return Err(ConfigError::Message(format!(
                    "printer {} max_fps must be > 0",
                    printer.name
                )));
            }
        }
        Ok(())
    }

    /// Decrypts every credential field in place using the given cipher.
    /// Values without the `encrypted:` sentinel pass through unchanged
    /// (first read of a plaintext legacy config, spec §6).
    pub fn decrypt_credentials(&mut self, cipher: &CredentialCipher) -> Result<()> {
        for printer in &mut self.printers {
            printer.ssh_password = cipher.decrypt_field(&printer.ssh_password)?;
            if let Some(pw) = &printer.mqtt_password {
                printer.mqtt_password = Some(cipher.decrypt_field(pw)?);
            }
            if printer.obico.enabled {
                printer.obico.auth_token = cipher.decrypt_field(&printer.obico.auth_token)?;
                printer.obico.device_secret = cipher.decrypt_field(&printer.obico.device_secret)?;
            }
        }
        Ok(())
    }

    /// Produces a copy with every credential field re-encrypted, suitable for
    /// `save_to_file`. The in-memory config passed to workers always holds
    /// plaintext; only the persisted copy carries ciphertext.
    pub fn encrypted_for_storage(&self, cipher: &CredentialCipher) -> Self {
        let mut out = self.clone();
        for printer in &mut out.printers {
            printer.ssh_password = cipher.encrypt(&printer.ssh_password);
            if let Some(pw) = &printer.mqtt_password {
                printer.mqtt_password = Some(cipher.encrypt(pw));
            }
            if printer.obico.enabled {
                printer.obico.auth_token = cipher.encrypt(&printer.obico.auth_token);
                printer.obico.device_secret = cipher.encrypt(&printer.obico.device_secret);
            }
        }
        out
    }

    /// Config with credential fields replaced by a fixed mask, for IPC
    /// `GetPrinterConfig` responses (spec §6).
    pub fn masked_printer(&self, name: &str) -> Result<PrinterConfig> {
        let printer = self
            .printers
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| AcproxycamError::system(format!("no printer named '{name}'")))?;
        let mut masked = printer.clone();
        masked.ssh_password = "***".to_string();
        if masked.mqtt_password.is_some() {
            masked.mqtt_password = Some("***".to_string());
        }
        if !masked.obico.auth_token.is_empty() {
            masked.obico.auth_token = "***".to_string();
        }
        if !masked.obico.device_secret.is_empty() {
            masked.obico.device_secret = "***".to_string();
        }
        Ok(masked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DaemonConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_port_rejected() {
        let mut config = DaemonConfig::default();
        config.printers.push(printer("a", 8080));
        config.printers.push(printer("b", 8080));
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut config = DaemonConfig::default();
        config.printers.push(printer("a", 8080));
        config.printers.push(printer("a", 8081));
        assert!(config.validate().is_err());
    }

    #[test]
    fn credential_round_trip_through_storage() {
        let cipher = CredentialCipher::from_secret(b"test-machine-id");
        let mut config = DaemonConfig::default();
        let mut p = printer("k1", 8080);
        p.ssh_password = "hunter2".to_string();
        p.mqtt_password = Some("mqtt-secret".to_string());
        config.printers.push(p);

        let stored = config.encrypted_for_storage(&cipher);
        assert!(CredentialCipher::is_encrypted(&stored.printers[0].ssh_password));

        let mut loaded = stored;
        loaded.decrypt_credentials(&cipher).unwrap();
        assert_eq!(loaded.printers[0].ssh_password, "hunter2");
        assert_eq!(loaded.printers[0].mqtt_password.as_deref(), Some("mqtt-secret"));
    }

    #[test]
    fn masked_printer_hides_credentials() {
        let mut config = DaemonConfig::default();
        let mut p = printer("k1", 8080);
        p.ssh_password = "hunter2".to_string();
        config.printers.push(p);

        let masked = config.masked_printer("k1").unwrap();
        assert_eq!(masked.ssh_password, "***");
    }

    fn printer(name: &str, port: u16) -> PrinterConfig {
        PrinterConfig {
            name: name.to_string(),
            ip: "10.0.0.5".to_string(),
            mjpeg_port: port,
            ssh_port: default_ssh_port(),
            mqtt_port: default_mqtt_port(),
            ssh_username: "root".to_string(),
            ssh_password: String::new(),
            mqtt_username: None,
            mqtt_password: None,
            device_id: None,
            model_code: None,
            device_type: None,
            max_fps: default_max_fps(),
            idle_fps: default_idle_fps(),
            jpeg_quality: default_jpeg_quality(),
            camera_enabled: true,
            send_stop_command: true,
            auto_lan_mode: false,
            led_auto_control: true,
            standby_led_timeout_minutes: default_standby_led_timeout_minutes(),
            camera_keepalive_seconds: default_camera_keepalive_seconds(),
            ll_hls_enabled: false,
            hls_part_duration_ms: default_hls_part_duration_ms(),
            obico: ObicoConfig::default(),
        }
    }
}

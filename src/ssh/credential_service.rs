//! SshCredentialService (spec §4.4): reads well-known files on the printer
//! filesystem over a short-lived SSH session to recover MQTT credentials
//! and device identity. The exact file paths are vendor firmware internals
//! not present anywhere in the reference pack or in `original_source/`
//! (empty in this build) -- these are named plausibly and isolated to this
//! module's constants, the same unresolved-unknown treatment as the MQTT
//! wire format in `mqtt::topics` (see DESIGN.md).

use crate::error::{Result, SshError};

use super::session::SshSession;

const MQTT_CREDENTIALS_FILE: &str = "/userdata/app/gk/config/mqtt.json";
const DEVICE_INFO_FILE: &str = "/userdata/app/gk/config/device.json";

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct MqttCredentialsFile {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct DeviceInfoFile {
    device_id: Option<String>,
    device_type: Option<String>,
    model_code: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievedCredentials {
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub device_id: Option<String>,
    pub device_type: Option<String>,
    pub model_code: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievedPrinterInfo {
    pub device_id: Option<String>,
    pub device_type: Option<String>,
    pub model_code: Option<String>,
}

pub struct SshCredentialService;

impl SshCredentialService {
    pub async fn retrieve_credentials(host: &str, port: u16, username: &str, password: &str) -> Result<RetrievedCredentials> {
        let mut session = SshSession::connect(host, port, username, password).await?;

        let mqtt_raw = session.run_command(&format!("cat {MQTT_CREDENTIALS_FILE}")).await?;
        let device_raw = session.run_command(&format!("cat {DEVICE_INFO_FILE}")).await?;
        session.close().await;

        let mqtt: MqttCredentialsFile = serde_json::from_str(&mqtt_raw).map_err(|_| SshError::MissingCredentialFile(MQTT_CREDENTIALS_FILE.into()))?;
        let device: DeviceInfoFile = serde_json::from_str(&device_raw).map_err(|_| SshError::MissingCredentialFile(DEVICE_INFO_FILE.into()))?;

        Ok(RetrievedCredentials {
            mqtt_username: mqtt.username,
            mqtt_password: mqtt.password,
            device_id: device.device_id,
            device_type: device.device_type,
            model_code: device.model_code,
        })
    }

    pub async fn retrieve_printer_info(host: &str, port: u16, username: &str, password: &str) -> Result<RetrievedPrinterInfo> {
        let mut session = SshSession::connect(host, port, username, password).await?;
        let device_raw = session.run_command(&format!("cat {DEVICE_INFO_FILE}")).await?;
        session.close().await;

        let device: DeviceInfoFile = serde_json::from_str(&device_raw).map_err(|_| SshError::MissingCredentialFile(DEVICE_INFO_FILE.into()))?;
        Ok(RetrievedPrinterInfo { device_id: device.device_id, device_type: device.device_type, model_code: device.model_code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mqtt_credentials_file_parses_partial_json() {
        let parsed: MqttCredentialsFile = serde_json::from_str(r#"{"username":"u"}"#).unwrap();
        assert_eq!(parsed.username.as_deref(), Some("u"));
        assert!(parsed.password.is_none());
    }

    #[test]
    fn device_info_file_parses_full_json() {
        let parsed: DeviceInfoFile = serde_json::from_str(r#"{"device_id":"D1","device_type":"T1","model_code":"M1"}"#).unwrap();
        assert_eq!(parsed.device_id.as_deref(), Some("D1"));
        assert_eq!(parsed.model_code.as_deref(), Some("M1"));
    }
}

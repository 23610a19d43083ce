//! Error taxonomy for the daemon and every component it owns.
//!
//! Mirrors the nested-enum-plus-severity shape used throughout the project's
//! structural ancestor: one `thiserror` enum per component, collected into a
//! root `AcproxycamError`, each carrying enough structure for the
//! recoverability/severity classification spec §7 describes.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AcproxycamError>;

#[derive(Error, Debug)]
pub enum AcproxycamError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("mqtt error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("ssh error: {0}")]
    Ssh(#[from] SshError),

    #[error("lan mode error: {0}")]
    LanMode(#[from] LanModeError),

    #[error("stream server error: {0}")]
    Stream(#[from] StreamError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("obico bridge error: {0}")]
    Obico(#[from] ObicoError),

    #[error("ipc error: {0}")]
    Ipc(#[from] IpcError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("{message}")]
    System { message: String },

    #[error("component '{component}' error: {message}")]
    Component { component: String, message: String },

    #[error("recovery failed for component '{component}' after {attempts} attempts")]
    RecoveryFailed { component: String, attempts: u32 },

    #[error("shutdown error")]
    Shutdown,
}

impl AcproxycamError {
    pub fn system(message: impl Into<String>) -> Self {
        Self::System { message: message.into() }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component { component: component.into(), message: message.into() }
    }

    pub fn recovery_failed(component: impl Into<String>, attempts: u32) -> Self {
        Self::RecoveryFailed { component: component.into(), attempts }
    }

    /// Whether the worker supervision loop should keep retrying (spec §7 taxonomy 1-3)
    /// versus the error is one the caller must react to synchronously (taxonomy 4) or
    /// that should bring the process down (taxonomy 5).
    pub fn is_recoverable(&self) -> bool {
        match self {
            AcproxycamError::Mqtt(e) => e.is_recoverable(),
            AcproxycamError::Ssh(e) => e.is_recoverable(),
            AcproxycamError::LanMode(e) => e.is_recoverable(),
            AcproxycamError::Stream(e) => e.is_recoverable(),
            AcproxycamError::Registry(_) => false,
            AcproxycamError::Obico(e) => e.is_recoverable(),
            AcproxycamError::Io(_) => true,
            AcproxycamError::Component { .. } => true,
            _ => false,
        }
    }

    pub fn component_name(&self) -> &str {
        match self {
            AcproxycamError::Mqtt(_) => "mqtt",
            AcproxycamError::Ssh(_) => "ssh",
            AcproxycamError::LanMode(_) => "lan_mode",
            AcproxycamError::Stream(_) => "stream",
            AcproxycamError::Registry(_) => "registry",
            AcproxycamError::Obico(_) => "obico",
            AcproxycamError::Ipc(_) => "ipc",
            AcproxycamError::Crypto(_) => "crypto",
            AcproxycamError::Codec(_) => "codec",
            AcproxycamError::Component { component, .. } => component.as_str(),
            _ => "system",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AcproxycamError::System { .. }
            | AcproxycamError::RecoveryFailed { .. }
            | AcproxycamError::Shutdown
            | AcproxycamError::Registry(_) => ErrorSeverity::Critical,
            AcproxycamError::Mqtt(_) | AcproxycamError::Ssh(_) | AcproxycamError::LanMode(_) => {
                ErrorSeverity::Warning
            }
            AcproxycamError::Stream(_) | AcproxycamError::Obico(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            ErrorSeverity::Info => tracing::Level::INFO,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Critical => tracing::Level::ERROR,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum MqttError {
    #[error("connect failed: {reason}")]
    ConnectFailed { reason: String },
    #[error("authentication failed")]
    AuthFailed,
    #[error("not connected")]
    NotConnected,
    #[error("request '{key}' timed out after {timeout:?}")]
    RequestTimeout { key: String, timeout: Duration },
    #[error("a request for key '{key}' is already in flight")]
    RequestInFlight { key: String },
    #[error("model code not detected within {0:?}")]
    ModelDetectTimeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

impl MqttError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, MqttError::AuthFailed)
    }
}

#[derive(Error, Debug, Clone)]
pub enum SshError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("authentication failed")]
    AuthFailed,
    #[error("command execution failed: {0}")]
    CommandFailed(String),
    #[error("required file '{0}' missing or unparsable on printer")]
    MissingCredentialFile(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl SshError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SshError::AuthFailed)
    }
}

#[derive(Error, Debug, Clone)]
pub enum LanModeError {
    #[error("tunnel connect failed: {0}")]
    TunnelFailed(String),
    #[error("deadline of {0:?} elapsed while waiting for lan mode to open")]
    DeadlineElapsed(Duration),
    #[error("malformed response from printer json api")]
    MalformedResponse,
}

impl LanModeError {
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to bind {address}: {source}")]
    BindFailed { address: String, #[source] source: std::io::Error },
    #[error("server startup failed: {0}")]
    StartupFailed(String),
    #[error("client connection error: {0}")]
    ClientConnection(String),
    #[error("frame encoding error: {0}")]
    FrameEncoding(String),
    #[error("no frame available")]
    NoFrame,
    #[error("http error: {0}")]
    Http(String),
}

impl StreamError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StreamError::BindFailed { .. })
    }
}

#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("a printer named '{0}' already exists")]
    DuplicateName(String),
    #[error("mjpeg port {0} is already in use")]
    DuplicatePort(u16),
    #[error("mjpeg port {0} could not be bound: {1}")]
    PortNotBindable(u16, String),
    #[error("no printer named '{0}'")]
    NotFound(String),
}

#[derive(Error, Debug, Clone)]
pub enum ObicoError {
    #[error("moonraker connection error: {0}")]
    MoonrakerConnection(String),
    #[error("obico server connection error: {0}")]
    ServerConnection(String),
    #[error("obico auth token conflict (4321)")]
    AuthTokenConflict,
    #[error("janus negotiation failed: {0}")]
    JanusFailed(String),
    #[error("request '{0}' timed out")]
    RequestTimeout(String),
}

impl ObicoError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ObicoError::AuthTokenConflict)
    }
}

#[derive(Error, Debug, Clone)]
pub enum IpcError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("socket bind failed: {0}")]
    BindFailed(String),
}

#[derive(Error, Debug, Clone)]
pub enum CryptoError {
    #[error("could not determine a machine identifier")]
    NoMachineId,
    #[error("ciphertext is malformed or truncated")]
    MalformedCiphertext,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("base64 decode failed: {0}")]
    Base64(String),
}

#[derive(Error, Debug, Clone)]
pub enum CodecError {
    #[error("unrecognized extradata format")]
    UnrecognizedExtradata,
    #[error("nal unit truncated")]
    TruncatedNal,
    #[error("no sps/pps available yet")]
    MissingParameterSets,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_not_recoverable() {
        let e = AcproxycamError::Mqtt(MqttError::AuthFailed);
        assert!(!e.is_recoverable());
        let e = AcproxycamError::Ssh(SshError::AuthFailed);
        assert!(!e.is_recoverable());
    }

    #[test]
    fn transient_errors_are_recoverable() {
        let e = AcproxycamError::Mqtt(MqttError::ConnectFailed { reason: "refused".into() });
        assert!(e.is_recoverable());
    }

    #[test]
    fn component_name_extraction() {
        let e = AcproxycamError::Ssh(SshError::Timeout(Duration::from_secs(10)));
        assert_eq!(e.component_name(), "ssh");
    }

    #[test]
    fn severity_classification() {
        assert_eq!(AcproxycamError::system("boom").severity(), ErrorSeverity::Critical);
        assert_eq!(
            AcproxycamError::Mqtt(MqttError::NotConnected).severity(),
            ErrorSeverity::Warning
        );
    }
}

//! SSH management channel: credential bootstrap and LAN-mode tunneling
//! (spec §4.4, component C4).

mod credential_service;
mod lan_mode;
mod session;

pub use credential_service::{RetrievedCredentials, RetrievedPrinterInfo, SshCredentialService};
pub use lan_mode::{LanModeResult, LanModeService};
pub use session::SshSession;

//! A short-lived SSH session wrapper shared by `SshCredentialService` and
//! `LanModeService` (spec §4.4): connect, authenticate by password, run one
//! command and collect its stdout, or open a direct-tcpip tunnel. `russh` +
//! `russh-keys` were picked as the SSH client crates because no SSH client
//! appears anywhere in the 444-file reference pack; `openssh` (seen in
//! fussybeaver-bollard) was considered and rejected since it shells out to
//! the system `ssh` binary rather than giving a pure-async client suited to
//! password auth plus TCP tunneling (documented in DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use tokio::time::timeout;

use crate::error::{Result, SshError};

const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

struct PermissiveHandler;

#[async_trait::async_trait]
impl client::Handler for PermissiveHandler {
    type Error = russh::Error;

    // Embedded printer firmware does not publish a verifiable host key
    // through any channel this daemon has access to; accept any key.
    async fn check_server_key(&mut self, _server_public_key: &russh_keys::key::PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshSession {
    handle: Handle<PermissiveHandler>,
}

impl SshSession {
    pub async fn connect(host: &str, port: u16, username: &str, password: &str) -> Result<Self> {
        let config = Arc::new(client::Config::default());
        let addr = format!("{host}:{port}");

        let connect = client::connect(config, addr, PermissiveHandler);
        let mut handle = timeout(SESSION_TIMEOUT, connect)
            .await
            .map_err(|_| SshError::Timeout(SESSION_TIMEOUT))?
            .map_err(|e| SshError::ConnectFailed(e.to_string()))?;

        let authenticated = timeout(SESSION_TIMEOUT, handle.authenticate_password(username, password))
            .await
            .map_err(|_| SshError::Timeout(SESSION_TIMEOUT))?
            .map_err(|e| SshError::ConnectFailed(e.to_string()))?;

        if !authenticated {
            return Err(SshError::AuthFailed.into());
        }

        Ok(Self { handle })
    }

    /// Runs one command to completion and returns its stdout as UTF-8
    /// (lossily, since embedded shells occasionally emit non-UTF8 noise).
    pub async fn run_command(&mut self, command: &str) -> Result<String> {
        let mut channel = self.handle.channel_open_session().await.map_err(|e| SshError::CommandFailed(e.to_string()))?;
        channel.exec(true, command).await.map_err(|e| SshError::CommandFailed(e.to_string()))?;

        let mut stdout = Vec::new();
        let collect = async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                    Some(ChannelMsg::ExitStatus { .. }) | None => break,
                    Some(_) => {}
                }
            }
        };
        timeout(SESSION_TIMEOUT, collect).await.map_err(|_| SshError::Timeout(SESSION_TIMEOUT))?;

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Opens a direct-tcpip tunnel to a loopback-only port on the printer,
    /// for `LanModeService`'s on-device JSON API (spec §4.4).
    pub async fn open_tunnel(&mut self, target_port: u16) -> Result<russh::Channel<russh::client::Msg>> {
        self.handle
            .channel_open_direct_tcpip("127.0.0.1", target_port as u32, "127.0.0.1", 0)
            .await
            .map_err(|e| SshError::CommandFailed(e.to_string()).into())
    }

    pub async fn close(mut self) {
        let _ = self.handle.disconnect(Disconnect::ByApplication, "", "en").await;
    }
}

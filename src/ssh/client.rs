// ABOUTME: SSH session management using russh.
// ABOUTME: Connects, authenticates, runs commands and streams files onto the host.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::ssh_key::PublicKey;
use russh::{Channel, ChannelMsg, Disconnect};

use super::auth::Credentials;
use super::error::{Error, Result};
use super::host_keys::KnownHosts;

/// Where to connect and how to prove who we are.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key to use. Without one the agent, then `~/.ssh` keys, are tried.
    pub identity: Option<PathBuf>,
    pub known_hosts: KnownHosts,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            identity: None,
            known_hosts: KnownHosts::default(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity = Some(path.into());
        self
    }

    pub fn known_hosts(mut self, known_hosts: KnownHosts) -> Self {
        self.known_hosts = known_hosts;
        self
    }
}

/// Interval between keepalive requests on an otherwise quiet connection.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Unanswered keepalives before the connection is considered dead.
const KEEPALIVE_MAX: usize = 4;

/// Transport settings for every session.
///
/// A remote step may print nothing for minutes, so there is no inactivity
/// cutoff; each command's own timeout bounds it and keepalives detect a
/// dead peer.
fn transport_config() -> client::Config {
    client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(KEEPALIVE_INTERVAL),
        keepalive_max: KEEPALIVE_MAX,
        ..Default::default()
    }
}

/// Output of a command that ran to completion on the host.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

struct HostKeyCheck {
    host: String,
    port: u16,
    known_hosts: KnownHosts,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self
            .known_hosts
            .verify(&self.host, self.port, server_public_key))
    }
}

/// An authenticated SSH connection. Each command gets its own channel.
pub struct Session {
    host: String,
    port: u16,
    handle: Handle<HostKeyCheck>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let credentials = Credentials::discover(config.identity.as_deref()).await?;

        let russh_config = transport_config();
        let check = HostKeyCheck {
            host: config.host.clone(),
            port: config.port,
            known_hosts: config.known_hosts.clone(),
        };

        let mut handle = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            check,
        )
        .await
        .map_err(|e| Error::Connect {
            addr: format!("{}:{}", config.host, config.port),
            reason: e.to_string(),
        })?;

        credentials.authenticate(&mut handle, &config.user).await?;
        tracing::debug!(host = %config.host, port = config.port, user = %config.user, "SSH session established");

        Ok(Self {
            host: config.host,
            port: config.port,
            handle,
        })
    }

    /// Run `command`, giving up after `timeout`.
    ///
    /// A timeout abandons the channel; the remote process may keep running.
    pub async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let run = async {
            let channel = self.open(command).await?;
            drain(channel).await
        };
        tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Write `data` to `remote_path` on the host, replacing any existing file.
    ///
    /// The bytes are piped into `cat` over an exec channel, so the server
    /// needs no SFTP subsystem.
    pub async fn upload(&self, data: &[u8], remote_path: &str, timeout: Duration) -> Result<()> {
        let failed = |reason: String| Error::Upload {
            path: remote_path.to_string(),
            reason,
        };
        let command = format!("cat > '{}'", remote_path.replace('\'', "'\\''"));

        let transfer = async {
            let channel = self.open(&command).await?;
            channel.data(data).await.map_err(|e| failed(e.to_string()))?;
            channel.eof().await.map_err(Error::Protocol)?;
            drain(channel).await
        };
        let output = tokio::time::timeout(timeout, transfer)
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        if output.success() {
            Ok(())
        } else {
            Err(failed(output.stderr.trim().to_string()))
        }
    }

    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)
    }

    async fn open(&self, command: &str) -> Result<Channel<client::Msg>> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Channel(format!("cannot open channel: {}", e)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::Channel(format!("cannot start command: {}", e)))?;
        Ok(channel)
    }
}

/// Collect a channel's output until it has reported both exit status and EOF.
async fn drain(mut channel: Channel<client::Msg>) -> Result<CommandOutput> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;
    let mut eof = false;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
            // Extended data stream 1 is stderr.
            ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
            ChannelMsg::Eof => eof = true,
            ChannelMsg::Close => break,
            _ => {}
        }
        if eof && exit_code.is_some() {
            break;
        }
    }

    // Closing without an exit status means the connection went away mid-command.
    let exit_code = exit_code.ok_or(Error::NoExitStatus)?;
    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_commands_are_not_cut_off() {
        let config = transport_config();
        assert_eq!(config.inactivity_timeout, None);
        assert_eq!(config.keepalive_interval, Some(KEEPALIVE_INTERVAL));
        assert!(KEEPALIVE_INTERVAL * KEEPALIVE_MAX as u32 > Duration::from_secs(30));
    }
}

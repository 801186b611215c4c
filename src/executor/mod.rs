// ABOUTME: Capability for running commands and copying payloads onto deployment targets.
// ABOUTME: Transports are SSH (russh) or a local shell; both honor per-call timeouts.

mod error;
mod local;
mod ssh;

pub use error::{ExecutorError, ExecutorErrorKind, TimeoutSnafu, TransportSnafu};
pub use local::LocalExecutor;
pub use ssh::SshExecutor;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::types::Environment;

/// How commands reach a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Ssh,
    Local,
}

/// A resolved deployment target: where commands run and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    /// Private key path; `None` means SSH agent or default keys.
    pub identity: Option<PathBuf>,
    /// Directory every command runs in and relative copy paths resolve against.
    pub working_dir: String,
    pub transport: Transport,
    pub trust_first_connection: bool,
    pub known_hosts: Option<PathBuf>,
}

impl Target {
    /// A target on this machine, mostly useful for single-host setups and tests.
    pub fn local(environment: Environment, working_dir: impl Into<String>) -> Self {
        Self {
            environment,
            host: "localhost".to_string(),
            port: 22,
            user: None,
            identity: None,
            working_dir: working_dir.into(),
            transport: Transport::Local,
            trust_first_connection: false,
            known_hosts: None,
        }
    }

    /// Human-readable `[user@]host:port` label.
    pub fn label(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}:{}", user, self.host, self.port),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// Resolve a possibly relative path against the working directory.
    pub fn resolve_path(&self, path: &str) -> String {
        if path.starts_with('/') || self.working_dir.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.working_dir.trim_end_matches('/'), path)
        }
    }
}

/// Output of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run commands on, and copy payloads to, a deployment target.
///
/// Commands run with the target's working directory already established.
/// Failing to reach the target surfaces as [`ExecutorError::Transport`];
/// exceeding `timeout` surfaces as [`ExecutorError::Timeout`] and says nothing
/// about whether the remote command was stopped.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(
        &self,
        target: &Target,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutorError>;

    async fn copy_to(
        &self,
        target: &Target,
        payload: &[u8],
        remote_path: &str,
        timeout: Duration,
    ) -> Result<(), ExecutorError>;

    /// Release any connections held for targets. Default: nothing to release.
    async fn shutdown(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Build the executor matching a target's transport.
pub fn executor_for(transport: Transport) -> Arc<dyn RemoteExecutor> {
    match transport {
        Transport::Ssh => Arc::new(SshExecutor::new()),
        Transport::Local => Arc::new(LocalExecutor::new()),
    }
}

/// Quote a string for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_includes_user_when_set() {
        let mut target = Target::local(Environment::Dev, "/srv");
        assert_eq!(target.label(), "localhost:22");
        target.user = Some("deploy".to_string());
        assert_eq!(target.label(), "deploy@localhost:22");
    }

    #[test]
    fn resolve_path_joins_relative_paths() {
        let target = Target::local(Environment::Dev, "/opt/web/");
        assert_eq!(target.resolve_path(".env.dev"), "/opt/web/.env.dev");
        assert_eq!(target.resolve_path("/etc/app.env"), "/etc/app.env");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("/opt/web"), "'/opt/web'");
    }
}

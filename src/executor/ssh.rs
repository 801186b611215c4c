// ABOUTME: Executor backed by russh sessions, one cached session per target.
// ABOUTME: Prefixes commands with `cd <working_dir>` and uploads payloads over exec channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CommandOutput, ExecutorError, RemoteExecutor, Target, shell_quote};
use crate::ssh::{self, KnownHosts, Session, SessionConfig};

#[derive(Default)]
pub struct SshExecutor {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

impl SshExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    async fn session(&self, target: &Target, timeout: Duration) -> Result<Arc<Session>, ExecutorError> {
        let label = target.label();
        if let Some(session) = self.sessions.lock().get(&label).cloned() {
            return Ok(session);
        }

        tracing::debug!(target = %label, "connecting");
        let session = match tokio::time::timeout(timeout, Session::connect(session_config(target))).await {
            Ok(Ok(session)) => Arc::new(session),
            Ok(Err(e)) => return Err(ExecutorError::transport(&label, e.to_string())),
            Err(_) => return Err(ExecutorError::timeout(&label, timeout)),
        };

        self.sessions.lock().insert(label, Arc::clone(&session));
        Ok(session)
    }

    fn map_error(&self, target: &Target, err: ssh::Error) -> ExecutorError {
        let label = target.label();
        match err {
            ssh::Error::Timeout(timeout) => ExecutorError::timeout(&label, timeout),
            other => {
                // A broken session is useless for the next call; reconnect then.
                self.sessions.lock().remove(&label);
                ExecutorError::transport(&label, other.to_string())
            }
        }
    }
}

fn session_config(target: &Target) -> SessionConfig {
    let user = target
        .user
        .clone()
        .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()));

    let mut known_hosts = KnownHosts::default().trust_unknown(target.trust_first_connection);
    if let Some(path) = &target.known_hosts {
        known_hosts = known_hosts.file(path);
    }

    let mut config = SessionConfig::new(&target.host, user)
        .port(target.port)
        .known_hosts(known_hosts);
    if let Some(key) = &target.identity {
        config = config.identity(key);
    }
    config
}

/// Wrap a command so it runs inside the target's working directory.
pub(crate) fn in_working_dir(target: &Target, command: &str) -> String {
    if target.working_dir.is_empty() {
        command.to_string()
    } else {
        format!("cd {} && {}", shell_quote(&target.working_dir), command)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(
        &self,
        target: &Target,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutorError> {
        let session = self.session(target, timeout).await?;
        let wrapped = in_working_dir(target, command);
        tracing::debug!(target = %target.label(), command = %wrapped, "running remote command");

        let output = session
            .exec(&wrapped, timeout)
            .await
            .map_err(|e| self.map_error(target, e))?;

        Ok(CommandOutput {
            exit_code: i32::try_from(output.exit_code).unwrap_or(i32::MAX),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn copy_to(
        &self,
        target: &Target,
        payload: &[u8],
        remote_path: &str,
        timeout: Duration,
    ) -> Result<(), ExecutorError> {
        let session = self.session(target, timeout).await?;
        let path = target.resolve_path(remote_path);
        tracing::debug!(target = %target.label(), %path, bytes = payload.len(), "uploading payload");

        session
            .upload(payload, &path, timeout)
            .await
            .map_err(|e| self.map_error(target, e))
    }

    async fn shutdown(&self) -> Vec<String> {
        let sessions: Vec<_> = self.sessions.lock().drain().collect();
        let mut warnings = Vec::new();
        for (label, session) in sessions {
            match Arc::try_unwrap(session) {
                Ok(session) => {
                    if let Err(e) = session.disconnect().await {
                        warnings.push(format!("SSH disconnect failed for {}: {}", label, e));
                    }
                }
                Err(_) => warnings.push(format!("SSH session for {} still in use at shutdown", label)),
            }
        }
        warnings
    }
}

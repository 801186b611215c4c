// ABOUTME: Executor that runs commands through `sh -c` on this machine.
// ABOUTME: Working directory comes from the target; copies are plain file writes.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{CommandOutput, ExecutorError, RemoteExecutor, Target};

#[derive(Debug, Default, Clone)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn execute(
        &self,
        target: &Target,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutorError> {
        let label = target.label();
        tracing::debug!(target = %label, %command, "running local command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !target.working_dir.is_empty() {
            cmd.current_dir(&target.working_dir);
        }

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ExecutorError::transport(&label, e.to_string())),
            Err(_) => return Err(ExecutorError::timeout(&label, timeout)),
        };

        Ok(CommandOutput {
            // Killed by a signal: no exit code, report the conventional shell value.
            exit_code: output.status.code().unwrap_or(128),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn copy_to(
        &self,
        target: &Target,
        payload: &[u8],
        remote_path: &str,
        timeout: Duration,
    ) -> Result<(), ExecutorError> {
        let label = target.label();
        let path = target.resolve_path(remote_path);

        let write = async {
            if let Some(parent) = Path::new(&path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, payload).await
        };

        match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => {
                tracing::debug!(target = %label, %path, bytes = payload.len(), "copied payload");
                Ok(())
            }
            Ok(Err(e)) => Err(ExecutorError::transport(
                &label,
                format!("failed to write {}: {}", path, e),
            )),
            Err(_) => Err(ExecutorError::timeout(&label, timeout)),
        }
    }
}

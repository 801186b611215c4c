// ABOUTME: The Applying step shared by forward deploys and restores.
// ABOUTME: Ships the env file, then runs the stop, apply and start templates in order.

use std::future::Future;

use crate::cancel::CancelToken;
use crate::config::EnvironmentSettings;
use crate::executor::{CommandOutput, ExecutorError, RemoteExecutor};
use crate::types::Version;

use super::DeployError;

/// Put `version` live on the target with `payload` as its env file.
///
/// Stops at the first failing step. A timed-out step says nothing about what
/// the target did; callers must re-verify.
pub(crate) async fn apply_release(
    executor: &dyn RemoteExecutor,
    settings: &EnvironmentSettings,
    version: Version,
    payload: &[u8],
    cancel: Option<&CancelToken>,
) -> Result<(), DeployError> {
    let target = &settings.target;
    let timeout = settings.command_timeout;
    let vars = settings.vars(version);
    let env_file = settings.environment.record_filename();

    tracing::info!(environment = %settings.environment, %version, step = "copy", "shipping configuration");
    cancellable(cancel, executor.copy_to(target, payload, &env_file, timeout)).await??;

    let steps = [
        ("stop", &settings.commands.stop),
        ("apply", &settings.commands.apply),
        ("start", &settings.commands.start),
    ];
    for (step, template) in steps {
        let command = vars.render(template);
        tracing::info!(environment = %settings.environment, %version, step, "running step");
        let output: CommandOutput =
            cancellable(cancel, executor.execute(target, &command, timeout)).await??;
        if !output.success() {
            return Err(DeployError::CommandFailed {
                step,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
    }
    Ok(())
}

/// Await an executor call unless cancellation arrives first.
async fn cancellable<T>(
    cancel: Option<&CancelToken>,
    fut: impl Future<Output = Result<T, ExecutorError>>,
) -> Result<Result<T, ExecutorError>, DeployError> {
    match cancel {
        None => Ok(fut.await),
        Some(token) if token.is_cancelled() => Err(DeployError::Cancelled),
        Some(token) => tokio::select! {
            result = fut => Ok(result),
            _ = token.cancelled() => Err(DeployError::Cancelled),
        },
    }
}

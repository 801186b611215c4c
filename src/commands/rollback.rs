// ABOUTME: Rollback command implementation.
// ABOUTME: Restores an environment's last known-good snapshot.

use stagecoach::config::Config;
use stagecoach::deploy::DeploymentController;
use stagecoach::error::Result;
use stagecoach::executor::executor_for;
use stagecoach::output::Output;
use stagecoach::types::Environment;

use super::print_report;

/// Re-apply the last known-good state of `environment`.
pub async fn rollback(
    config: Config,
    environment: Environment,
    force_lease: bool,
    output: Output,
) -> Result<i32> {
    let output = output.timed();
    let settings = config.for_environment(environment)?;
    let executor = executor_for(settings.target.transport);

    output.progress(&format!(
        "Rolling back {} on {} ({})",
        settings.service,
        environment,
        settings.target.label()
    ));

    let controller = DeploymentController::new(config, executor.clone());
    let result = controller.rollback(environment, force_lease).await;

    for warning in executor.shutdown().await {
        output.warning(&warning);
    }

    let report = result?;
    Ok(print_report(&output, &report, "rollback"))
}

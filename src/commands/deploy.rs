// ABOUTME: Deploy command implementation.
// ABOUTME: Wires the executor, Ctrl-C cancellation and the controller together.

use stagecoach::cancel::CancelToken;
use stagecoach::config::Config;
use stagecoach::deploy::{DeployRequest, DeploymentController};
use stagecoach::error::Result;
use stagecoach::executor::executor_for;
use stagecoach::output::Output;

use super::print_report;

/// Deploy one version to one environment.
pub async fn deploy(config: Config, request: DeployRequest, output: Output) -> Result<i32> {
    let output = output.timed();
    let settings = config.for_environment(request.environment)?;
    let executor = executor_for(settings.target.transport);

    let what = match (request.version, request.increment) {
        (Some(version), _) => version.to_string(),
        (None, Some(kind)) => format!("next {} version", kind),
        (None, None) => "?".to_string(),
    };
    output.progress(&format!(
        "Deploying {} ({}) to {} on {}",
        settings.service,
        what,
        request.environment,
        settings.target.label()
    ));

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling deployment");
            trigger.cancel();
        }
    });

    let controller = DeploymentController::new(config, executor.clone());
    let result = controller.deploy(&request, &cancel).await;
    interrupt.abort();

    for warning in executor.shutdown().await {
        output.warning(&warning);
    }

    let report = result?;
    Ok(print_report(&output, &report, "deploy"))
}

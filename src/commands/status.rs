// ABOUTME: Status command implementation.
// ABOUTME: Prints recorded version, backup, last attempt, snapshot and lease per environment.

use std::fmt::Write;

use stagecoach::config::Config;
use stagecoach::deploy::{DeploymentController, EnvironmentStatus};
use stagecoach::error::Result;
use stagecoach::executor::executor_for;
use stagecoach::output::Output;
use stagecoach::types::Environment;

/// Show one environment, or every configured one.
pub async fn status(
    config: Config,
    environment: Option<Environment>,
    live: bool,
    output: Output,
) -> Result<i32> {
    let environments: Vec<Environment> = match environment {
        Some(env) => {
            config.for_environment(env)?;
            vec![env]
        }
        None => config.environments.keys().copied().collect(),
    };

    let mut statuses = Vec::with_capacity(environments.len());
    for env in environments {
        let settings = config.for_environment(env)?;
        let executor = executor_for(settings.target.transport);
        let controller = DeploymentController::new(config.clone(), executor.clone());
        let result = controller.status(env, live).await;
        for warning in executor.shutdown().await {
            output.warning(&warning);
        }
        statuses.push(result?);
    }

    let human = statuses
        .iter()
        .map(render)
        .collect::<Vec<_>>()
        .join("\n");
    output.report(&statuses, &human);
    Ok(0)
}

fn render(status: &EnvironmentStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", status.environment);
    let _ = writeln!(out, "  version:  {}", or_none(status.version.map(|v| v.to_string())));
    let _ = writeln!(
        out,
        "  backup:   {}",
        or_none(status.backup_version.map(|v| v.to_string()))
    );
    let snapshot = match (status.snapshot_version, status.snapshot_taken_at) {
        (Some(version), Some(at)) => Some(format!("{} (taken {})", version, at.to_rfc3339())),
        _ => None,
    };
    let _ = writeln!(out, "  snapshot: {}", or_none(snapshot));
    let last = status.last_attempt.as_ref().map(|a| {
        let mut line = format!("{} {} {}", a.id, a.target_version, a.outcome);
        if a.escalated {
            line.push_str(" (escalated)");
        }
        if let Some(reason) = &a.reason {
            line.push_str(&format!(": {}", reason));
        }
        line
    });
    let _ = writeln!(out, "  last:     {}", or_none(last));
    let lease = status.lease.as_ref().map(|l| {
        format!(
            "held by {} (pid {}) since {}{}",
            l.holder,
            l.pid,
            l.started_at.to_rfc3339(),
            if l.is_stale() { ", stale" } else { "" }
        )
    });
    let _ = write!(out, "  lease:    {}", lease.unwrap_or_else(|| "free".to_string()));
    if let Some(live) = &status.live {
        let _ = write!(out, "\n  live:\n");
        for line in live.lines() {
            let _ = writeln!(out, "    {}", line);
        }
    }
    out.trim_end().to_string()
}

fn or_none(value: Option<String>) -> String {
    value.unwrap_or_else(|| "none".to_string())
}

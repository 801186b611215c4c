// ABOUTME: Command handlers for the stagecoach CLI.
// ABOUTME: Each handler returns the process exit code for a completed run.

mod deploy;
mod rollback;
mod status;
mod version;

pub use deploy::deploy;
pub use rollback::rollback;
pub use status::status;
pub use version::{bump, seed};

use std::path::Path;

use serde::Serialize;
use stagecoach::config::Config;
use stagecoach::deploy::{DeployReport, DeploymentAttempt};
use stagecoach::error::Result;
use stagecoach::health::HealthVerdict;
use stagecoach::output::Output;

/// Load `--config` when given, otherwise discover a config in the working directory.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover(&std::env::current_dir()?),
    }
}

#[derive(Serialize)]
struct ReportSummary<'a> {
    attempt: &'a DeploymentAttempt,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<&'a HealthVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_kind: Option<String>,
}

/// Print a finished deploy or rollback and return its exit code.
fn print_report(output: &Output, report: &DeployReport, action: &str) -> i32 {
    for warning in &report.warnings {
        output.warning(&warning.message);
    }

    let attempt = &report.attempt;
    if output.is_json() {
        let summary = ReportSummary {
            attempt,
            verdict: report.verdict.as_ref(),
            failure: report.failure.as_ref().map(|e| e.to_string()),
            failure_kind: report.failure.as_ref().map(|e| format!("{:?}", e.kind())),
        };
        output.report(&summary, "");
        return report.exit_code();
    }

    if report.succeeded() {
        let cycles = report.verdict.as_ref().map(|v| v.cycles).unwrap_or(0);
        output.success(&format!(
            "{} {} to {}: healthy after {} probe cycle(s)",
            action, attempt.target_version, attempt.environment, cycles
        ));
    } else {
        let reason = report
            .failure
            .as_ref()
            .map(|e| e.to_string())
            .or_else(|| attempt.reason.clone())
            .unwrap_or_default();
        output.error(&format!(
            "{} {} to {} ended {}: {}",
            action, attempt.target_version, attempt.environment, attempt.outcome, reason
        ));
        if let Some(verdict) = report.verdict.as_ref().filter(|v| !v.passed()) {
            output.error(&format!("failing probes: {}", verdict.failure_summary()));
        }
        if attempt.escalated {
            output.error(&format!(
                "rollback did not restore {}; manual intervention required",
                attempt.environment
            ));
            if let Some(recorded) = attempt.reason.as_deref().filter(|r| *r != reason) {
                output.error(recorded);
            }
        }
    }
    report.exit_code()
}

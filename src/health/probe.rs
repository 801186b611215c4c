// ABOUTME: Turns a configured probe into a target command and judges its output.
// ABOUTME: http compares status codes, readiness inspects JSON, smoke checks the exit code.

use std::time::Duration;

use crate::config::{ProbeKind, TemplateVars};
use crate::executor::{CommandOutput, shell_quote};

/// Outcome of a single probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Pass,
    Fail(String),
}

/// Shell command that performs the probe on the target.
pub(crate) fn command_for(kind: &ProbeKind, timeout: Duration, vars: &TemplateVars) -> String {
    let max_time = timeout.as_secs().max(1);
    match kind {
        ProbeKind::Http { url, .. } => format!(
            "curl -s -o /dev/null -w '%{{http_code}}' --max-time {} {}",
            max_time,
            shell_quote(&vars.render(url))
        ),
        ProbeKind::Readiness { url, .. } => format!(
            "curl -s --max-time {} {}",
            max_time,
            shell_quote(&vars.render(url))
        ),
        ProbeKind::Smoke { command } => vars.render(command),
    }
}

pub(crate) fn evaluate(kind: &ProbeKind, output: &CommandOutput) -> ProbeOutcome {
    match kind {
        ProbeKind::Http { expect_status, .. } => {
            let code = output.stdout.trim();
            match code.parse::<u16>() {
                Ok(status) if status == *expect_status => ProbeOutcome::Pass,
                Ok(0) | Err(_) => ProbeOutcome::Fail(format!(
                    "no HTTP response (curl exit {})",
                    output.exit_code
                )),
                Ok(status) => {
                    ProbeOutcome::Fail(format!("status {} (expected {})", status, expect_status))
                }
            }
        }
        ProbeKind::Readiness { field, expect, .. } => {
            if !output.success() {
                return ProbeOutcome::Fail(format!("request failed (exit {})", output.exit_code));
            }
            let body: serde_json::Value = match serde_json::from_str(output.stdout.trim()) {
                Ok(body) => body,
                Err(e) => return ProbeOutcome::Fail(format!("response is not JSON: {}", e)),
            };
            match lookup(&body, field).map(scalar_string) {
                Some(Some(actual)) if actual == *expect => ProbeOutcome::Pass,
                Some(Some(actual)) => {
                    ProbeOutcome::Fail(format!("{} is {:?} (expected {:?})", field, actual, expect))
                }
                Some(None) => ProbeOutcome::Fail(format!("{} is not a scalar", field)),
                None => ProbeOutcome::Fail(format!("{} missing from response", field)),
            }
        }
        ProbeKind::Smoke { .. } => {
            if output.success() {
                ProbeOutcome::Pass
            } else {
                let stderr = output.stderr.trim();
                if stderr.is_empty() {
                    ProbeOutcome::Fail(format!("exit {}", output.exit_code))
                } else {
                    ProbeOutcome::Fail(format!("exit {}: {}", output.exit_code, stderr))
                }
            }
        }
    }
}

/// Follow a dotted path through objects (and arrays, by index).
fn lookup<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        serde_json::Value::Object(map) => map.get(segment),
        serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn scalar_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Null => Some("null".to_string()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

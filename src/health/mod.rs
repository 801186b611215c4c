// ABOUTME: Health verification of a freshly applied (or restored) target.
// ABOUTME: Runs the whole probe checklist per attempt and aggregates a verdict.

mod checker;
mod probe;

pub use checker::{Cancelled, HealthChecker, RetryPolicy};
pub use probe::ProbeOutcome;

use serde::Serialize;

/// Pass or fail of one probe, or of a whole attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
}

impl CheckStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, CheckStatus::Pass)
    }
}

/// One probe's result within an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Result of the last probe cycle run by [`HealthChecker::verify`].
///
/// `overall` is `Pass` only when every probe passed within that same cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthVerdict {
    pub checks: Vec<CheckResult>,
    pub overall: CheckStatus,
    /// Probe cycles actually run.
    pub cycles: u32,
}

impl HealthVerdict {
    pub fn passed(&self) -> bool {
        self.overall.is_pass()
    }

    /// Names of the probes that failed in the last cycle, with their reasons.
    pub fn failure_summary(&self) -> String {
        self.checks
            .iter()
            .filter(|c| !c.status.is_pass())
            .map(|c| match &c.detail {
                Some(detail) => format!("{}: {}", c.name, detail),
                None => c.name.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

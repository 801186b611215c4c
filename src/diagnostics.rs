// ABOUTME: Non-fatal problems gathered while a deploy or rollback runs.
// ABOUTME: They never change the outcome, only what the user is told afterwards.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The environment lease could not be released.
    Lease,
    /// A post-deploy or on-error hook failed.
    Hook,
    /// A snapshot or attempt record could not be written.
    State,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WarningKind::Lease => "lease",
            WarningKind::Hook => "hook",
            WarningKind::State => "state",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Log and keep a warning.
    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%kind, "{}", message);
        self.warnings.push(Warning { kind, message });
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: States carry the data that must exist once they are reached.

use std::fmt;

use super::DeployError;
use super::snapshot::Snapshot;
use crate::health::HealthVerdict;

/// Validated: lease held, target version computed, policy satisfied.
/// Available actions: `snapshot()`
#[derive(Debug)]
pub struct Validated {
    /// Env file to ship, rendered at the target version.
    pub(crate) payload: String,
}

/// Snapshotted: pre-attempt state captured, nothing touched yet.
/// Available actions: `apply()`, `rollback()`
#[derive(Debug)]
pub struct Snapshotted {
    pub(crate) snapshot: Snapshot,
    pub(crate) payload: String,
}

/// Applied: new version shipped and started.
/// Available actions: `verify()`, `rollback()`
#[derive(Debug)]
pub struct Applied {
    pub(crate) snapshot: Snapshot,
    pub(crate) payload: String,
}

/// Verified: the checklist passed on one attempt.
/// Available actions: `commit()`, `rollback()`
#[derive(Debug)]
pub struct Verified {
    pub(crate) snapshot: Snapshot,
    pub(crate) payload: String,
    pub(crate) verdict: HealthVerdict,
}

/// Committed: new version persisted as current.
/// Available actions: `finish()`
#[derive(Debug)]
pub struct Committed {
    pub(crate) verdict: HealthVerdict,
    /// Non-fatal problems met while committing.
    pub(crate) warnings: Vec<String>,
}

/// RolledBack: pre-attempt snapshot restored and confirmed.
/// Available actions: `finish()`
#[derive(Debug)]
pub struct RolledBack {
    pub(crate) cause: DeployError,
    pub(crate) verdict: HealthVerdict,
}

/// States from which the pre-attempt snapshot can be restored.
pub trait Restorable {
    fn snapshot(&self) -> &Snapshot;
}

impl Restorable for Snapshotted {
    fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl Restorable for Applied {
    fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl Restorable for Verified {
    fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

/// Controller phases, as they appear in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Snapshotting,
    Applying,
    Verifying,
    Committed,
    RollingBack,
    Success,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Validating => "validating",
            Phase::Snapshotting => "snapshotting",
            Phase::Applying => "applying",
            Phase::Verifying => "verifying",
            Phase::Committed => "committed",
            Phase::RollingBack => "rolling_back",
            Phase::Success => "success",
            Phase::Failed => "failed",
        })
    }
}

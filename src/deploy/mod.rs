// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports the controller, state markers, leases, snapshots and attempt records.

mod apply;
mod attempt;
mod controller;
mod deployment;
mod error;
mod lease;
mod snapshot;
mod state;
mod transitions;

pub use attempt::{AttemptLog, DeploymentAttempt, Outcome};
pub use controller::{DeployReport, DeployRequest, DeploymentController, EnvironmentStatus};
pub use deployment::Deployment;
pub use error::{DeployError, DeployErrorKind, LeaseHolderInfo};
pub use lease::{Lease, LeaseInfo};
pub use snapshot::{RollbackManager, Snapshot, SnapshotStore};
pub use state::{Applied, Committed, Phase, Restorable, RolledBack, Snapshotted, Validated, Verified};
pub use transitions::{DeployContext, TerminalResult, TransitionResult};

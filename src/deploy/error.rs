// ABOUTME: Error types for deployment orchestration.
// ABOUTME: Every component error bubbles here unchanged; kind() and exit_code() classify them.

use chrono::{DateTime, Utc};

use crate::error::{EXIT_FAILURE, EXIT_REJECTED};
use crate::executor::{ExecutorError, ExecutorErrorKind};
use crate::types::{Environment, VersionError};
use crate::version::StoreError;

/// Who holds the lease that blocked an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseHolderInfo {
    pub environment: Environment,
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Errors that can occur while validating, applying, verifying or rolling back.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Malformed version or request, rejected before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// Current state could not be read; nothing was touched.
    #[error("snapshot failed: {0}")]
    Snapshot(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error(
        "deploy to {} in progress: held by {} (pid {}) since {}",
        .0.environment, .0.holder, .0.pid, .0.started_at
    )]
    Conflict(LeaseHolderInfo),

    #[error("health check failed: {0}")]
    HealthCheck(String),

    #[error("{step} command exited with {exit_code}: {stderr}")]
    CommandFailed {
        step: &'static str,
        exit_code: i32,
        stderr: String,
    },

    #[error("deployment cancelled")]
    Cancelled,

    /// Restoring the snapshot failed. Needs a human.
    #[error("rollback failed, manual intervention required: {0}")]
    Rollback(String),

    /// Local state (lease, snapshot, attempt log) could not be read or written.
    #[error("state storage error: {0}")]
    Storage(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    InvalidInput,
    NotFound,
    Transport,
    Timeout,
    Snapshot,
    PolicyViolation,
    Conflict,
    HealthCheck,
    CommandFailed,
    Cancelled,
    Rollback,
    Storage,
}

impl DeployError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::InvalidInput(_) | DeployError::Version(_) => DeployErrorKind::InvalidInput,
            DeployError::Store(e) if e.is_not_found() => DeployErrorKind::NotFound,
            DeployError::Store(StoreError::Malformed { .. }) => DeployErrorKind::InvalidInput,
            DeployError::Store(_) => DeployErrorKind::Storage,
            DeployError::Executor(e) => match e.kind() {
                ExecutorErrorKind::Transport => DeployErrorKind::Transport,
                ExecutorErrorKind::Timeout => DeployErrorKind::Timeout,
            },
            DeployError::Snapshot(_) => DeployErrorKind::Snapshot,
            DeployError::PolicyViolation(_) => DeployErrorKind::PolicyViolation,
            DeployError::Conflict(_) => DeployErrorKind::Conflict,
            DeployError::HealthCheck(_) => DeployErrorKind::HealthCheck,
            DeployError::CommandFailed { .. } => DeployErrorKind::CommandFailed,
            DeployError::Cancelled => DeployErrorKind::Cancelled,
            DeployError::Rollback(_) => DeployErrorKind::Rollback,
            DeployError::Storage(_) => DeployErrorKind::Storage,
        }
    }

    /// Rejections and conflicts exit 2, everything else 1.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            DeployErrorKind::InvalidInput
            | DeployErrorKind::PolicyViolation
            | DeployErrorKind::Conflict => EXIT_REJECTED,
            _ => EXIT_FAILURE,
        }
    }

    /// Holder details if this is a lease conflict.
    pub fn lease_holder(&self) -> Option<&LeaseHolderInfo> {
        match self {
            DeployError::Conflict(info) => Some(info),
            _ => None,
        }
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        DeployError::Storage(format!("{}: {}", context, err))
    }
}

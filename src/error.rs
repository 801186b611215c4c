// ABOUTME: Application-wide error type for stagecoach.
// ABOUTME: Wraps module errors and maps every failure onto a process exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::types::{Environment, VersionError};
use crate::version::StoreError;

/// Exit code for a command that ran and failed.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for a request rejected before anything was touched, or a conflict.
pub const EXIT_REJECTED: i32 = 2;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("environment {0} is not configured")]
    UnknownEnvironment(Environment),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Deploy(e) => e.exit_code(),
            Error::Store(e) if !e.is_not_found() && !matches!(e, StoreError::Io { .. }) => {
                EXIT_REJECTED
            }
            Error::UnknownEnvironment(_)
            | Error::MissingEnvVar(_)
            | Error::InvalidConfig(_)
            | Error::InvalidInput(_)
            | Error::Version(_)
            | Error::Yaml(_)
            | Error::AlreadyExists(_) => EXIT_REJECTED,
            Error::Store(_) | Error::ConfigNotFound(_) | Error::Io(_) => EXIT_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_rejections() {
        let err: Error = VersionError::Empty.into();
        assert_eq!(err.exit_code(), EXIT_REJECTED);
        assert_eq!(Error::InvalidConfig("x".into()).exit_code(), EXIT_REJECTED);
    }

    #[test]
    fn missing_record_is_a_failure() {
        let err: Error = StoreError::NotFound {
            environment: Environment::Dev,
            path: PathBuf::from(".env.dev"),
        }
        .into();
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }
}

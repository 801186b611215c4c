// ABOUTME: Executor error types with SNAFU pattern.
// ABOUTME: Separates transport failures from exceeded time budgets.

use std::time::Duration;

use snafu::Snafu;

/// Failure to run a command on a target at all.
///
/// A command that ran and exited non-zero is not an error here; it is
/// reported through `CommandOutput::exit_code`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExecutorError {
    #[snafu(display("transport failure reaching {target}: {message}"))]
    Transport { target: String, message: String },

    /// The remote side effect of a timed-out command is unknown.
    #[snafu(display("command on {target} exceeded its {timeout:?} budget"))]
    Timeout { target: String, timeout: Duration },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorKind {
    /// Host unreachable, authentication failure, broken channel.
    Transport,
    /// The caller-supplied timeout elapsed.
    Timeout,
}

impl ExecutorError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ExecutorErrorKind {
        match self {
            ExecutorError::Transport { .. } => ExecutorErrorKind::Transport,
            ExecutorError::Timeout { .. } => ExecutorErrorKind::Timeout,
        }
    }

    pub(crate) fn transport(target: &str, message: impl Into<String>) -> Self {
        TransportSnafu {
            target,
            message: message.into(),
        }
        .build()
    }

    pub(crate) fn timeout(target: &str, timeout: Duration) -> Self {
        TimeoutSnafu { target, timeout }.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(
            ExecutorError::transport("dev", "refused").kind(),
            ExecutorErrorKind::Transport
        );
        assert_eq!(
            ExecutorError::timeout("dev", Duration::from_secs(1)).kind(),
            ExecutorErrorKind::Timeout
        );
    }

    #[test]
    fn display_names_target() {
        let err = ExecutorError::transport("deploy@web:22", "connection refused");
        assert_eq!(
            err.to_string(),
            "transport failure reaching deploy@web:22: connection refused"
        );
    }
}

// ABOUTME: Failures of the SSH transport: reaching a host, logging in, running commands.
// ABOUTME: The executor folds all of these into transport or timeout errors.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("no credentials available: {0}")]
    NoCredentials(String),

    #[error("cannot load private key {}: {reason}", .path.display())]
    Key { path: PathBuf, reason: String },

    #[error("server rejected every key offered for user {user}")]
    Rejected { user: String },

    #[error("channel error: {0}")]
    Channel(String),

    #[error("remote command exceeded {0:?}")]
    Timeout(Duration),

    #[error("channel closed before the command reported an exit status")]
    NoExitStatus,

    #[error("cannot write {path}: {reason}")]
    Upload { path: String, reason: String },

    #[error(transparent)]
    Protocol(#[from] russh::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

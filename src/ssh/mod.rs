// ABOUTME: SSH client module for remote deployment targets.
// ABOUTME: Agent or key authentication with known_hosts verification, over russh.

mod auth;
mod client;
mod error;
mod host_keys;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::{Error, Result};
pub use host_keys::KnownHosts;

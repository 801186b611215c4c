// ABOUTME: Library root for stagecoach - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod cancel;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod health;
pub mod hooks;
pub mod output;
pub mod ssh;
pub mod types;
pub mod version;

// ABOUTME: Seed and bump commands operating directly on version records.
// ABOUTME: Work with a discovered config or, without one, the working directory.

use std::path::{Path, PathBuf};

use stagecoach::config::Config;
use stagecoach::deploy::Lease;
use stagecoach::error::{Error, Result};
use stagecoach::output::Output;
use stagecoach::types::{Environment, IncrementKind, Version};
use stagecoach::version::{FileVersionStore, VersionStore, next_version};

use super::load_config;

/// Where records and leases live for this invocation.
struct Paths {
    versions: PathBuf,
    state: PathBuf,
}

impl Paths {
    /// An explicit `--config` must load; a failed discovery falls back to the working directory.
    fn resolve(config_path: Option<&Path>) -> Result<Self> {
        match load_config(config_path) {
            Ok(config) => Ok(Self::from_config(&config)),
            Err(Error::ConfigNotFound(dir)) if config_path.is_none() => Ok(Self {
                versions: dir.clone(),
                state: dir.join(".stagecoach"),
            }),
            Err(e) => Err(e),
        }
    }

    fn from_config(config: &Config) -> Self {
        Self {
            versions: config.versions_path(),
            state: config.state_path(),
        }
    }
}

/// Write the first version record for an environment.
pub fn seed(
    config_path: Option<&Path>,
    environment: Environment,
    version: Version,
    force: bool,
    output: Output,
) -> Result<i32> {
    let paths = Paths::resolve(config_path)?;
    let store = FileVersionStore::new(&paths.versions);

    // A forced seed rewrites the record, so it waits for the lease like bump does.
    let lease = Lease::acquire(&paths.state, environment, false)?;
    store.seed(environment, &version, force)?;
    release(lease, environment, &output);

    output.success(&format!(
        "Seeded {} at {} ({})",
        environment,
        version,
        store.record_path(environment).display()
    ));
    Ok(0)
}

/// Increment a recorded version without deploying it.
pub fn bump(
    config_path: Option<&Path>,
    environment: Environment,
    kind: IncrementKind,
    dry_run: bool,
    output: Output,
) -> Result<i32> {
    let paths = Paths::resolve(config_path)?;
    let store = FileVersionStore::new(&paths.versions);

    // Same lease as deploy so a bump never races an in-flight attempt.
    let lease = if dry_run {
        None
    } else {
        Some(Lease::acquire(&paths.state, environment, false)?)
    };

    let current = store.load(environment)?;
    let next = next_version(current, kind)?;
    if !dry_run {
        store.save(environment, &next)?;
    }

    if let Some(lease) = lease {
        release(lease, environment, &output);
    }

    let verb = if dry_run { "Would bump" } else { "Bumped" };
    output.success(&format!("{} {}: {} -> {}", verb, environment, current, next));
    Ok(0)
}

fn release(lease: Lease, environment: Environment, output: &Output) {
    if let Err(e) = lease.release() {
        output.warning(&format!("failed to release lease for {}: {}", environment, e));
    }
}

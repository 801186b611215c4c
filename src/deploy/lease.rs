// ABOUTME: Per-environment advisory lease preventing concurrent deploy attempts.
// ABOUTME: <state_dir>/leases/<env>.lock holds JSON holder info, changed only under <env>.guard.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DeployError, LeaseHolderInfo};
use crate::types::Environment;

/// Information about who holds a lease.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseInfo {
    /// Hostname of the machine that holds the lease.
    pub holder: String,
    /// Process ID of the lease holder.
    pub pid: u32,
    /// When the lease was acquired.
    pub started_at: DateTime<Utc>,
    pub environment: Environment,
}

impl LeaseInfo {
    /// Create new lease info for the current process.
    pub fn new(environment: Environment) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            environment,
        }
    }

    /// Check if this lease is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    /// Path to the lease file for an environment.
    pub fn lease_path(state_dir: &Path, environment: Environment) -> PathBuf {
        state_dir
            .join("leases")
            .join(format!("{}.lock", environment))
    }

    /// Read the current holder of an environment's lease, if any.
    pub fn read(state_dir: &Path, environment: Environment) -> Option<LeaseInfo> {
        let text = fs::read_to_string(Self::lease_path(state_dir, environment)).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn holder_info(&self) -> LeaseHolderInfo {
        LeaseHolderInfo {
            environment: self.environment,
            holder: self.holder.clone(),
            pid: self.pid,
            started_at: self.started_at,
        }
    }
}

/// A held lease that releases on drop.
#[derive(Debug)]
pub struct Lease {
    path: PathBuf,
    info: LeaseInfo,
    released: bool,
}

impl Lease {
    /// Acquire the lease for `environment`.
    ///
    /// Every check and change of the lease file happens while holding an
    /// exclusive lock on `<env>.guard`, so racing processes and threads are
    /// serialized. The lease body is written aside and hard-linked into
    /// place, so readers never see a half-written file. Stale (>1 hour) or
    /// unreadable leases are broken with a warning; `force` breaks a live one.
    pub fn acquire(state_dir: &Path, environment: Environment, force: bool) -> Result<Self, DeployError> {
        let path = LeaseInfo::lease_path(state_dir, environment);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| DeployError::storage("failed to create lease directory", e))?;
        }

        let info = LeaseInfo::new(environment);
        let body = serde_json::to_string(&info)
            .map_err(|e| DeployError::storage("failed to serialize lease", e))?;

        let _guard = Guard::lock(&path)?;

        if publish(&path, &body)? {
            tracing::debug!(%environment, path = %path.display(), "lease acquired");
            return Ok(Self::held(path, info));
        }

        match Self::existing(&path) {
            Some(existing) if !force && !existing.is_stale() => {
                return Err(DeployError::Conflict(existing.holder_info()));
            }
            Some(existing) if force => tracing::warn!(
                "Breaking lease held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            ),
            Some(existing) => tracing::warn!(
                "Auto-breaking stale lease held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            ),
            None => tracing::warn!("Lease info unreadable, breaking lease"),
        }

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DeployError::storage("failed to break lease", e)),
        }

        if publish(&path, &body)? {
            return Ok(Self::held(path, info));
        }

        // Only a writer ignoring the guard can get here.
        match Self::existing(&path) {
            Some(existing) => Err(DeployError::Conflict(existing.holder_info())),
            None => Err(DeployError::Storage(
                "lease recreated by another process during break".to_string(),
            )),
        }
    }

    fn held(path: PathBuf, info: LeaseInfo) -> Self {
        Self {
            path,
            info,
            released: false,
        }
    }

    fn existing(path: &Path) -> Option<LeaseInfo> {
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn info(&self) -> &LeaseInfo {
        &self.info
    }

    /// Release the lease, reporting a failure to remove the file.
    pub fn release(mut self) -> std::io::Result<()> {
        self.released = true;
        self.remove()
    }

    fn remove(&self) -> std::io::Result<()> {
        let _guard = Guard::lock(&self.path).map_err(|e| std::io::Error::other(e.to_string()))?;
        // Only remove the file if it is still ours; a forced break may have replaced it.
        match Self::existing(&self.path) {
            Some(current) if current != self.info => {
                tracing::warn!(path = %self.path.display(), "lease was taken over, leaving it in place");
                Ok(())
            }
            _ => match fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => {
                    tracing::debug!(environment = %self.info.environment, "lease released");
                    Ok(())
                }
            },
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.remove()
        {
            tracing::warn!(path = %self.path.display(), "failed to release lease: {}", e);
        }
    }
}

/// Exclusive lock on the lease's companion `.guard` file, held until drop.
///
/// The guard file itself is never removed; deleting it would let two
/// processes lock different inodes under the same name.
struct Guard {
    _file: File,
}

impl Guard {
    fn lock(lease_path: &Path) -> Result<Self, DeployError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lease_path.with_extension("guard"))
            .map_err(|e| DeployError::storage("failed to open lease guard", e))?;
        file.lock()
            .map_err(|e| DeployError::storage("failed to lock lease guard", e))?;
        Ok(Self { _file: file })
    }
}

/// Write `body` beside the lease and hard-link it into place.
/// `Ok(false)` means a lease file already exists.
fn publish(path: &Path, body: &str) -> Result<bool, DeployError> {
    let staged = path.with_extension("lock.tmp");
    let write = || -> std::io::Result<()> {
        let mut file = File::create(&staged)?;
        file.write_all(body.as_bytes())?;
        file.sync_all()
    };
    write().map_err(|e| DeployError::storage("failed to write lease", e))?;

    let linked = match fs::hard_link(&staged, path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(DeployError::storage("failed to create lease", e)),
    };
    if let Err(e) = fs::remove_file(&staged) {
        tracing::debug!(path = %staged.display(), "failed to remove staged lease: {}", e);
    }
    linked
}

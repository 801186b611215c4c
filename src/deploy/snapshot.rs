// ABOUTME: Last-known-good snapshots: capture, persistence, and restore.
// ABOUTME: A restore is a forward apply of the snapshot's version and configuration.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeployError;
use super::apply::apply_release;
use crate::config::EnvironmentSettings;
use crate::executor::RemoteExecutor;
use crate::types::{Environment, Version};
use crate::version::{VersionStore, write_atomic};

/// Deployed state of one environment at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub environment: Environment,
    pub version: Version,
    pub taken_at: DateTime<Utc>,
    /// The env file as it was on the target.
    pub configuration: String,
}

impl Snapshot {
    /// Same deployed state, ignoring when it was observed.
    pub fn same_state(&self, other: &Snapshot) -> bool {
        self.environment == other.environment
            && self.version == other.version
            && self.configuration == other.configuration
    }
}

/// One persisted snapshot per environment under `<state_dir>/snapshots/`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("snapshots"),
        }
    }

    pub fn path(&self, environment: Environment) -> PathBuf {
        self.dir.join(format!("{}.json", environment))
    }

    pub fn load(&self, environment: Environment) -> Result<Option<Snapshot>, DeployError> {
        let path = self.path(environment);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DeployError::storage("failed to read snapshot", e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| DeployError::storage(&format!("corrupt snapshot {}", path.display()), e))
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<(), DeployError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| DeployError::storage("failed to serialize snapshot", e))?;
        write_atomic(&self.path(snapshot.environment), json.as_bytes())
            .map_err(|e| DeployError::storage("failed to write snapshot", e))?;
        tracing::debug!(environment = %snapshot.environment, version = %snapshot.version, "snapshot persisted");
        Ok(())
    }

    /// Persist `snapshot` only if the environment has none yet.
    pub fn save_if_absent(&self, snapshot: &Snapshot) -> Result<bool, DeployError> {
        if self.path(snapshot.environment).exists() {
            return Ok(false);
        }
        self.save(snapshot)?;
        Ok(true)
    }
}

/// Captures and restores snapshots for one environment.
pub struct RollbackManager<'a> {
    executor: &'a dyn RemoteExecutor,
    settings: &'a EnvironmentSettings,
    store: &'a dyn VersionStore,
}

impl<'a> RollbackManager<'a> {
    pub fn new(
        executor: &'a dyn RemoteExecutor,
        settings: &'a EnvironmentSettings,
        store: &'a dyn VersionStore,
    ) -> Self {
        Self {
            executor,
            settings,
            store,
        }
    }

    /// Read the live version and configuration. Never mutates anything.
    pub async fn capture(&self) -> Result<Snapshot, DeployError> {
        let environment = self.settings.environment;
        let version = self.store.load(environment)?;

        let command = self.settings.vars(version).render(&self.settings.commands.capture);
        let output = self
            .executor
            .execute(&self.settings.target, &command, self.settings.command_timeout)
            .await
            .map_err(|e| DeployError::Snapshot(format!("cannot read live configuration: {}", e)))?;
        if !output.success() {
            return Err(DeployError::Snapshot(format!(
                "capture command exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        tracing::info!(%environment, %version, "captured snapshot");
        Ok(Snapshot {
            environment,
            version,
            taken_at: Utc::now(),
            configuration: output.stdout,
        })
    }

    /// Re-apply `snapshot` through the same steps as a forward deploy.
    ///
    /// Not cancellable: an interrupted restore would leave the target in
    /// neither state.
    pub async fn restore(&self, snapshot: &Snapshot) -> Result<(), DeployError> {
        tracing::warn!(
            environment = %snapshot.environment,
            version = %snapshot.version,
            "restoring snapshot"
        );
        apply_release(
            self.executor,
            self.settings,
            snapshot.version,
            snapshot.configuration.as_bytes(),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(version: Version) -> Snapshot {
        Snapshot {
            environment: Environment::Dev,
            version,
            taken_at: Utc::now(),
            configuration: "service_version=v1.0.0\n".into(),
        }
    }

    #[test]
    fn store_round_trip_and_save_if_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load(Environment::Dev).unwrap().is_none());

        let first = snapshot(Version::new(1, 0, 0));
        assert!(store.save_if_absent(&first).unwrap());
        assert!(!store.save_if_absent(&snapshot(Version::new(9, 9, 9))).unwrap());
        assert_eq!(store.load(Environment::Dev).unwrap(), Some(first));

        let second = snapshot(Version::new(1, 0, 1));
        store.save(&second).unwrap();
        assert_eq!(store.load(Environment::Dev).unwrap(), Some(second));
    }

    #[test]
    fn same_state_ignores_timestamp() {
        let a = snapshot(Version::new(1, 0, 0));
        let mut b = a.clone();
        b.taken_at = a.taken_at - chrono::Duration::minutes(5);
        assert!(a.same_state(&b));
        b.configuration.push_str("EXTRA=1\n");
        assert!(!a.same_state(&b));
    }

    #[test]
    fn corrupt_snapshot_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        fs::create_dir_all(dir.path().join("snapshots")).unwrap();
        fs::write(store.path(Environment::Dev), "{").unwrap();
        assert!(matches!(store.load(Environment::Dev), Err(DeployError::Storage(_))));
    }
}

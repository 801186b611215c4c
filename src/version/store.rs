// ABOUTME: Per-environment version records stored as key=value env files.
// ABOUTME: Writes are atomic (temp file + rename) and keep a .bak of the previous record.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{Environment, Version, VersionError};

/// Key holding the deployed version inside a record.
pub const VERSION_KEY: &str = "service_version";

/// Suffix of the backup copy written before each overwrite.
pub const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no version record for {environment} at {} (seed one first)", .path.display())]
    NotFound {
        environment: Environment,
        path: PathBuf,
    },

    #[error("service_version not found in {}", .path.display())]
    MissingVersion { path: PathBuf },

    #[error("invalid version in {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: VersionError,
    },

    #[error("version record already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// True for a missing record or a record without a version key.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::MissingVersion { .. }
        )
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Parsed contents of a record file.
///
/// Lines are kept verbatim so comments and unrelated keys survive a rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRecord {
    lines: Vec<String>,
}

impl VersionRecord {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// A record holding only the version key.
    pub fn with_only(version: &Version) -> Self {
        let mut record = Self::default();
        record.set_version(version);
        record
    }

    /// Raw value of the version key, if present.
    pub fn raw_version(&self) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            let (key, value) = split_pair(line)?;
            (key == VERSION_KEY).then_some(value)
        })
    }

    /// Look up any key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            let (k, value) = split_pair(line)?;
            (k == key).then_some(value)
        })
    }

    pub fn set_version(&mut self, version: &Version) {
        let rendered = format!("{VERSION_KEY}={version}");
        match self
            .lines
            .iter_mut()
            .find(|line| split_pair(line).is_some_and(|(k, _)| k == VERSION_KEY))
        {
            Some(line) => *line = rendered,
            None => self.lines.push(rendered),
        }
    }

    /// Copy of this record carrying a different version.
    pub fn at_version(&self, version: &Version) -> Self {
        let mut record = self.clone();
        record.set_version(version);
        record
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

fn split_pair(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

/// Read and write the current version of each environment.
pub trait VersionStore: Send + Sync {
    /// Current version. Fails with a not-found error when nothing was seeded.
    fn load(&self, environment: Environment) -> Result<Version, StoreError>;

    /// Atomically persist `version`, backing up the previous record first.
    fn save(&self, environment: Environment, version: &Version) -> Result<(), StoreError>;

    /// Full record, used as the configuration payload shipped to targets.
    fn record(&self, environment: Environment) -> Result<VersionRecord, StoreError>;

    /// Version held by the backup copy, if one exists.
    fn load_backup(&self, environment: Environment) -> Result<Option<Version>, StoreError>;
}

/// Version records as `.env.<environment>` files in one directory.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    dir: PathBuf,
}

impl FileVersionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, environment: Environment) -> PathBuf {
        self.dir.join(environment.record_filename())
    }

    pub fn backup_path(&self, environment: Environment) -> PathBuf {
        let mut name = environment.record_filename();
        name.push_str(BACKUP_SUFFIX);
        self.dir.join(name)
    }

    /// Create the initial record. Refuses to overwrite unless `force`.
    pub fn seed(
        &self,
        environment: Environment,
        version: &Version,
        force: bool,
    ) -> Result<(), StoreError> {
        let path = self.record_path(environment);
        if path.exists() && !force {
            return Err(StoreError::AlreadyExists(path));
        }
        if path.exists() {
            return self.save(environment, version);
        }
        write_atomic(&path, VersionRecord::with_only(version).render().as_bytes())
            .map_err(|e| StoreError::io(&path, e))
    }

    fn read_record(&self, environment: Environment, path: &Path) -> Result<VersionRecord, StoreError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(VersionRecord::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                environment,
                path: path.to_path_buf(),
            }),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn version_of(record: &VersionRecord, path: &Path) -> Result<Version, StoreError> {
        let raw = record.raw_version().ok_or_else(|| StoreError::MissingVersion {
            path: path.to_path_buf(),
        })?;
        Version::parse(raw).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl VersionStore for FileVersionStore {
    fn load(&self, environment: Environment) -> Result<Version, StoreError> {
        let path = self.record_path(environment);
        let record = self.read_record(environment, &path)?;
        Self::version_of(&record, &path)
    }

    fn save(&self, environment: Environment, version: &Version) -> Result<(), StoreError> {
        let path = self.record_path(environment);
        let record = match self.read_record(environment, &path) {
            Ok(existing) => {
                let backup = self.backup_path(environment);
                write_atomic(&backup, existing.render().as_bytes())
                    .map_err(|e| StoreError::io(&backup, e))?;
                existing.at_version(version)
            }
            Err(StoreError::NotFound { .. }) => VersionRecord::with_only(version),
            Err(e) => return Err(e),
        };

        write_atomic(&path, record.render().as_bytes()).map_err(|e| StoreError::io(&path, e))?;
        tracing::info!(%environment, %version, path = %path.display(), "saved version record");
        Ok(())
    }

    fn record(&self, environment: Environment) -> Result<VersionRecord, StoreError> {
        let path = self.record_path(environment);
        self.read_record(environment, &path)
    }

    fn load_backup(&self, environment: Environment) -> Result<Option<Version>, StoreError> {
        let path = self.backup_path(environment);
        match self.read_record(environment, &path) {
            Ok(record) => Self::version_of(&record, &path).map(Some),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Write `contents` to `path` so readers only ever see the old or the new file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

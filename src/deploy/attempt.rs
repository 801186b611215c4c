// ABOUTME: Deployment attempt records and their append-only JSON-lines log.
// ABOUTME: One log per environment; status reads the last line.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeployError;
use crate::types::{Environment, Version};
use crate::version::write_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Healthy,
    Failed,
    RolledBack,
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Outcome::Pending => "pending",
            Outcome::Healthy => "healthy",
            Outcome::Failed => "failed",
            Outcome::RolledBack => "rolled_back",
        })
    }
}

/// One run of the deployment state machine for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAttempt {
    pub id: String,
    pub environment: Environment,
    pub target_version: Version,
    pub previous_version: Option<Version>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Outcome,
    #[serde(default)]
    pub reason: Option<String>,
    /// Set when a rollback failed and a human has to step in.
    #[serde(default)]
    pub escalated: bool,
    #[serde(default)]
    pub probe_cycles: u32,
}

impl DeploymentAttempt {
    pub fn begin(
        environment: Environment,
        target_version: Version,
        previous_version: Option<Version>,
    ) -> Self {
        let started_at = Utc::now();
        Self {
            id: format!(
                "{}-{}-{}",
                environment,
                started_at.format("%Y%m%dT%H%M%S%.3fZ"),
                std::process::id()
            ),
            environment,
            target_version,
            previous_version,
            started_at,
            finished_at: None,
            outcome: Outcome::Pending,
            reason: None,
            escalated: false,
            probe_cycles: 0,
        }
    }

    /// Record the terminal outcome. A terminal attempt is never changed again.
    pub fn finish(mut self, outcome: Outcome, reason: Option<String>) -> Self {
        if self.outcome.is_terminal() {
            tracing::warn!(attempt = %self.id, "attempt already finished, keeping {}", self.outcome);
            return self;
        }
        self.outcome = outcome;
        self.reason = reason;
        self.finished_at = Some(Utc::now());
        self
    }

    /// Same as [`finish`](Self::finish) with the escalation flag raised.
    pub fn escalate(mut self, reason: String) -> Self {
        if !self.outcome.is_terminal() {
            self.escalated = true;
        }
        self.finish(Outcome::Failed, Some(reason))
    }
}

/// Records kept per environment before the oldest are dropped.
pub const DEFAULT_MAX_RECORDS: usize = 1000;

/// Append-only attempt history under `<state_dir>/attempts/`.
///
/// Each environment's log holds at most `max_records` lines; older lines are
/// dropped on append. Promotion checks only see what is retained.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    dir: PathBuf,
    max_records: usize,
}

impl AttemptLog {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("attempts"),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    pub fn max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    pub fn path(&self, environment: Environment) -> PathBuf {
        self.dir.join(format!("{}.jsonl", environment))
    }

    pub fn append(&self, attempt: &DeploymentAttempt) -> Result<(), DeployError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| DeployError::storage("failed to create attempt log directory", e))?;
        let mut line = serde_json::to_string(attempt)
            .map_err(|e| DeployError::storage("failed to serialize attempt", e))?;
        line.push('\n');

        let path = self.path(attempt.environment);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DeployError::storage("failed to open attempt log", e))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| DeployError::storage("failed to append attempt log", e))?;

        if let Err(e) = self.trim(&path) {
            tracing::warn!(path = %path.display(), "failed to trim attempt log: {}", e);
        }
        Ok(())
    }

    /// Drop the oldest lines once the log is over its limit.
    fn trim(&self, path: &Path) -> std::io::Result<()> {
        let text = fs::read_to_string(path)?;
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() <= self.max_records {
            return Ok(());
        }

        let dropped = lines.len() - self.max_records;
        let mut kept = lines[dropped..].join("\n");
        kept.push('\n');
        write_atomic(path, kept.as_bytes())?;
        tracing::debug!(path = %path.display(), dropped, "trimmed attempt log");
        Ok(())
    }

    /// Every recorded line, oldest first. Unparseable lines are skipped.
    pub fn entries(&self, environment: Environment) -> Result<Vec<DeploymentAttempt>, DeployError> {
        let text = match fs::read_to_string(self.path(environment)) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DeployError::storage("failed to read attempt log", e)),
        };
        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(attempt) => Some(attempt),
                Err(e) => {
                    tracing::warn!(%environment, "skipping unreadable attempt record: {}", e);
                    None
                }
            })
            .collect())
    }

    pub fn last(&self, environment: Environment) -> Result<Option<DeploymentAttempt>, DeployError> {
        Ok(self.entries(environment)?.pop())
    }

    /// Whether `version` was ever committed healthy in `environment`.
    pub fn has_healthy(&self, environment: Environment, version: &Version) -> Result<bool, DeployError> {
        Ok(self
            .entries(environment)?
            .iter()
            .any(|a| a.outcome == Outcome::Healthy && a.target_version == *version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_is_final() {
        let attempt = DeploymentAttempt::begin(Environment::Dev, Version::new(1, 0, 1), None)
            .finish(Outcome::Healthy, None);
        let again = attempt.clone().finish(Outcome::Failed, Some("late".into()));
        assert_eq!(again, attempt);

        let escalated = attempt.clone().escalate("late".into());
        assert!(!escalated.escalated);
    }

    #[test]
    fn escalate_marks_failed() {
        let attempt = DeploymentAttempt::begin(Environment::Prod, Version::new(2, 0, 0), None)
            .escalate("restore failed".into());
        assert_eq!(attempt.outcome, Outcome::Failed);
        assert!(attempt.escalated);
        assert!(attempt.finished_at.is_some());
    }

    #[test]
    fn outcome_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Outcome::RolledBack).unwrap(), "\"rolled_back\"");
    }

    #[test]
    fn log_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = AttemptLog::new(dir.path());
        assert!(log.last(Environment::Dev).unwrap().is_none());

        let pending = DeploymentAttempt::begin(Environment::Dev, Version::new(1, 1, 0), Some(Version::new(1, 0, 10)));
        log.append(&pending).unwrap();
        let done = pending.finish(Outcome::Healthy, None);
        log.append(&done).unwrap();

        assert_eq!(log.entries(Environment::Dev).unwrap().len(), 2);
        assert_eq!(log.last(Environment::Dev).unwrap().unwrap().outcome, Outcome::Healthy);
        assert!(log.has_healthy(Environment::Dev, &Version::new(1, 1, 0)).unwrap());
        assert!(!log.has_healthy(Environment::Dev, &Version::new(1, 0, 10)).unwrap());
        assert!(log.last(Environment::Prod).unwrap().is_none());
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = AttemptLog::new(dir.path());
        let attempt = DeploymentAttempt::begin(Environment::Stg, Version::new(0, 1, 0), None);
        log.append(&attempt).unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path(Environment::Stg)).unwrap();
        writeln!(file, "{{truncated").unwrap();
        assert_eq!(log.entries(Environment::Stg).unwrap().len(), 1);
    }

    #[test]
    fn log_keeps_only_the_newest_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = AttemptLog::new(dir.path()).max_records(3);
        for patch in 0..5 {
            let attempt = DeploymentAttempt::begin(Environment::Dev, Version::new(1, 0, patch), None)
                .finish(Outcome::Healthy, None);
            log.append(&attempt).unwrap();
        }

        let entries = log.entries(Environment::Dev).unwrap();
        let versions: Vec<_> = entries.iter().map(|a| a.target_version).collect();
        assert_eq!(
            versions,
            vec![Version::new(1, 0, 2), Version::new(1, 0, 3), Version::new(1, 0, 4)]
        );
        assert!(!log.has_healthy(Environment::Dev, &Version::new(1, 0, 0)).unwrap());
        assert_eq!(log.last(Environment::Dev).unwrap().unwrap().target_version, Version::new(1, 0, 4));
    }
}

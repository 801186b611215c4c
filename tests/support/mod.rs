// ABOUTME: Test support utilities.
// ABOUTME: Temporary projects deploying to local targets, plus a recording executor.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use stagecoach::config::Config;
use stagecoach::deploy::DeploymentController;
use stagecoach::executor::{CommandOutput, ExecutorError, LocalExecutor, RemoteExecutor, Target};
use stagecoach::types::{Environment, Version};
use stagecoach::version::FileVersionStore;
use tempfile::TempDir;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("stagecoach=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Start template that makes the shipped env file "live".
#[allow(dead_code)]
pub const START_LIVE: &str = "cp {env_file} live.env";

/// Probe passing whenever something is live.
#[allow(dead_code)]
pub const PROBE_LIVE: &str = "test -f live.env";

/// Config deploying `dev` to `targets/dev` through the local shell.
///
/// `extra` is appended under `environments:` and may define more environments.
#[allow(dead_code)]
pub fn local_yaml(start: &str, probe: &str, extra: &str) -> String {
    format!(
        r#"service: web
image: registry.example.com/acme/web
command_timeout: 2s
commands:
  stop: "true"
  apply: "true"
  start: "{start}"
health:
  max_attempts: 3
  interval: 10ms
  probe_timeout: 2s
  rollback_attempts: 1
  probes:
    - name: smoke
      kind: smoke
      command: "{probe}"
environments:
  dev:
    target:
      transport: local
      working_dir: targets/dev
{extra}"#
    )
}

/// YAML for an extra local environment, for use as `local_yaml`'s `extra`.
#[allow(dead_code)]
pub fn local_environment(environment: Environment, settings: &str) -> String {
    format!(
        "  {environment}:\n    target:\n      transport: local\n      working_dir: targets/{environment}\n{settings}"
    )
}

/// A project directory with a config, version records and local targets.
#[allow(dead_code)]
pub struct Project {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Project {
    pub fn new(yaml: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stagecoach.yml"), yaml).unwrap();
        for environment in Environment::ALL {
            fs::create_dir_all(dir.path().join("targets").join(environment.as_str())).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> Config {
        Config::discover(self.path()).unwrap()
    }

    pub fn store(&self) -> FileVersionStore {
        FileVersionStore::new(self.path())
    }

    pub fn seed(&self, environment: Environment, version: Version) {
        self.store().seed(environment, &version, false).unwrap();
    }

    pub fn target_dir(&self, environment: Environment) -> PathBuf {
        self.path().join("targets").join(environment.as_str())
    }

    /// Pretend `version` is already running on the target.
    pub fn make_live(&self, environment: Environment, version: Version) {
        let payload = format!("service_version={version}\n");
        let dir = self.target_dir(environment);
        fs::write(dir.join(environment.record_filename()), &payload).unwrap();
        fs::write(dir.join("live.env"), &payload).unwrap();
    }

    /// Contents of the live env file, or empty when nothing is live.
    pub fn live(&self, environment: Environment) -> String {
        fs::read_to_string(self.target_dir(environment).join("live.env")).unwrap_or_default()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.path().join(".stagecoach")
    }

    pub fn controller(&self) -> DeploymentController {
        DeploymentController::new(self.config(), Arc::new(LocalExecutor::new()))
    }
}

/// Executor that records every call and answers from a script.
///
/// A command containing a scripted needle gets that answer; anything else
/// succeeds with empty output.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingExecutor {
    answers: Vec<(String, CommandOutput)>,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, needle: &str, exit_code: i32, stdout: &str) -> Self {
        self.answers.push((
            needle.to_string(),
            CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn execute(
        &self,
        _target: &Target,
        command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, ExecutorError> {
        self.calls.lock().push(command.to_string());
        let answer = self
            .answers
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, output)| output.clone());
        Ok(answer.unwrap_or(CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }))
    }

    async fn copy_to(
        &self,
        _target: &Target,
        payload: &[u8],
        remote_path: &str,
        _timeout: Duration,
    ) -> Result<(), ExecutorError> {
        self.calls.lock().push(format!(
            "copy {} ({} bytes)",
            remote_path,
            payload.len()
        ));
        Ok(())
    }
}

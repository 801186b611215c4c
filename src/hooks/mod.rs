// ABOUTME: Project-local lifecycle scripts run around a deployment attempt.
// ABOUTME: Scripts live in .stagecoach/hooks and receive the attempt as STAGECOACH_* variables.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::types::{Environment, ServiceName, Version};

/// Default limit on a single hook run.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(300);

/// Where in an attempt a hook runs.
///
/// A failing `PreDeploy` hook rejects the attempt before anything is touched.
/// The other two only produce warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    PreDeploy,
    PostDeploy,
    OnError,
}

impl HookPoint {
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::PreDeploy => "pre-deploy",
            HookPoint::PostDeploy => "post-deploy",
            HookPoint::OnError => "on-error",
        }
    }
}

/// Facts about the attempt exposed to a hook.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub service: ServiceName,
    pub environment: Environment,
    pub version: Version,
    pub previous_version: Option<Version>,
    pub host: String,
}

impl HookContext {
    /// Variables set on the hook process. `STAGECOACH_PREVIOUS_VERSION` is
    /// omitted on a first deploy.
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("STAGECOACH_SERVICE", self.service.to_string()),
            ("STAGECOACH_ENVIRONMENT", self.environment.to_string()),
            ("STAGECOACH_VERSION", self.version.to_string()),
            ("STAGECOACH_HOST", self.host.clone()),
        ];
        if let Some(previous) = &self.previous_version {
            vars.push(("STAGECOACH_PREVIOUS_VERSION", previous.to_string()));
        }
        vars
    }
}

/// What a hook run produced. `status` is `None` when the script could not
/// be started, was killed by a signal, or ran past its timeout.
#[derive(Debug)]
pub struct HookOutcome {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl HookOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }

    fn not_run(reason: String) -> Self {
        Self {
            status: None,
            stdout: String::new(),
            stderr: reason,
        }
    }
}

pub struct HookRunner {
    dir: PathBuf,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl HookRunner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            working_dir: None,
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Run scripts from `dir` instead of the current directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.script(point).is_file()
    }

    fn script(&self, point: HookPoint) -> PathBuf {
        self.dir.join(point.filename())
    }

    /// Run the script for `point`. `None` means no script is installed.
    pub async fn run(&self, point: HookPoint, context: &HookContext) -> Option<HookOutcome> {
        let script = self.script(point);
        if !script.is_file() {
            tracing::debug!(hook = point.filename(), "no hook installed");
            return None;
        }

        tracing::info!(
            hook = point.filename(),
            environment = %context.environment,
            version = %context.version,
            "running hook"
        );

        let outcome = self.spawn(&script, context).await;
        match outcome.status {
            Some(0) => tracing::info!(hook = point.filename(), "hook succeeded"),
            status => tracing::warn!(
                hook = point.filename(),
                ?status,
                stderr = outcome.stderr.trim(),
                "hook failed"
            ),
        }
        Some(outcome)
    }

    async fn spawn(&self, script: &Path, context: &HookContext) -> HookOutcome {
        let mut command = Command::new(script);
        command
            .envs(context.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => HookOutcome {
                status: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Ok(Err(e)) => HookOutcome::not_run(format!("could not start {}: {}", script.display(), e)),
            Err(_) => HookOutcome::not_run(format!(
                "{} did not finish within {:?}",
                script.display(),
                self.timeout
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(previous: Option<Version>) -> HookContext {
        HookContext {
            service: ServiceName::new("myapp").unwrap(),
            environment: Environment::Stg,
            version: Version::new(1, 2, 3),
            previous_version: previous,
            host: "stg.example.com".to_string(),
        }
    }

    fn var<'a>(vars: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn context_vars() {
        let vars = context(Some(Version::new(1, 2, 2))).vars();
        assert_eq!(var(&vars, "STAGECOACH_SERVICE"), Some("myapp"));
        assert_eq!(var(&vars, "STAGECOACH_VERSION"), Some("v1.2.3"));
        assert_eq!(var(&vars, "STAGECOACH_PREVIOUS_VERSION"), Some("v1.2.2"));

        let first = context(None).vars();
        assert_eq!(var(&first, "STAGECOACH_PREVIOUS_VERSION"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("pre-deploy");
        std::fs::write(&script, "#!/bin/sh\necho \"$STAGECOACH_ENVIRONMENT\"\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = HookRunner::new(dir.path());
        let outcome = runner.run(HookPoint::PreDeploy, &context(None)).await.unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.status, Some(3));
        assert_eq!(outcome.stdout.trim(), "stg");
        assert!(runner.run(HookPoint::OnError, &context(None)).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_hook_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("post-deploy");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = HookRunner::new(dir.path()).timeout(Duration::from_millis(100));
        let outcome = runner.run(HookPoint::PostDeploy, &context(None)).await.unwrap();
        assert_eq!(outcome.status, None);
        assert!(outcome.stderr.contains("did not finish"));
    }
}

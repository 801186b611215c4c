// ABOUTME: Bounded retry loop around the probe checklist.
// ABOUTME: Every attempt runs all probes; the verdict passes only if one attempt passes entirely.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use super::probe::{self, ProbeOutcome};
use super::{CheckResult, CheckStatus, HealthVerdict};
use crate::cancel::CancelToken;
use crate::config::{HealthConfig, ProbeConfig, TemplateVars};
use crate::executor::{RemoteExecutor, Target};

/// Verification was interrupted by a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("health verification cancelled")]
pub struct Cancelled;

/// How many probe cycles to run and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub probe_timeout: Duration,
}

impl RetryPolicy {
    /// Full verification after a forward deploy.
    pub fn full(health: &HealthConfig) -> Self {
        Self {
            max_attempts: health.max_attempts,
            interval: health.interval,
            probe_timeout: health.probe_timeout,
        }
    }

    /// Reduced verification after a restore.
    pub fn reduced(health: &HealthConfig) -> Self {
        Self {
            max_attempts: health.rollback_attempts,
            ..Self::full(health)
        }
    }

    /// Time allowed for one probe call. The remote curl has its own
    /// `--max-time`, so the executor gets a little slack on top.
    fn call_budget(&self) -> Duration {
        self.probe_timeout.saturating_add(PROBE_SLACK)
    }
}

const PROBE_SLACK: Duration = Duration::from_secs(5);

pub struct HealthChecker<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> HealthChecker<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    /// Run the checklist until one attempt passes completely or
    /// `policy.max_attempts` attempts have failed.
    ///
    /// A failed verdict is not an error. The only error is cancellation, which
    /// is observed while probes run and while sleeping between attempts.
    pub async fn verify(
        &self,
        target: &Target,
        probes: &[ProbeConfig],
        vars: &TemplateVars,
        policy: RetryPolicy,
        cancel: Option<&CancelToken>,
    ) -> Result<HealthVerdict, Cancelled> {
        let max_attempts = policy.max_attempts.max(1);
        let mut cycles = 0;

        loop {
            cycles += 1;
            let checks = interruptible(cancel, self.run_cycle(target, probes, vars, policy)).await?;
            let overall = if checks.iter().all(|c| c.status.is_pass()) {
                CheckStatus::Pass
            } else {
                CheckStatus::Fail
            };

            tracing::info!(
                environment = %target.environment,
                cycle = cycles,
                max_attempts,
                passed = overall.is_pass(),
                "health check cycle finished"
            );

            let verdict = HealthVerdict {
                checks,
                overall,
                cycles,
            };
            if verdict.passed() || cycles >= max_attempts {
                return Ok(verdict);
            }

            tracing::debug!(
                failing = %verdict.failure_summary(),
                interval = ?policy.interval,
                "retrying health checks"
            );
            interruptible(cancel, tokio::time::sleep(policy.interval)).await?;
        }
    }

    async fn run_cycle(
        &self,
        target: &Target,
        probes: &[ProbeConfig],
        vars: &TemplateVars,
        policy: RetryPolicy,
    ) -> Vec<CheckResult> {
        let mut checks = Vec::with_capacity(probes.len());
        for probe in probes {
            let command = probe::command_for(&probe.kind, policy.probe_timeout, vars);
            let budget = policy.call_budget();
            let outcome = match self.executor.execute(target, &command, budget).await {
                Ok(output) => probe::evaluate(&probe.kind, &output),
                Err(e) => ProbeOutcome::Fail(e.to_string()),
            };

            let (status, detail) = match outcome {
                ProbeOutcome::Pass => (CheckStatus::Pass, None),
                ProbeOutcome::Fail(reason) => (CheckStatus::Fail, Some(reason)),
            };
            tracing::debug!(probe = %probe.name, ?status, detail = detail.as_deref().unwrap_or(""), "probe finished");
            checks.push(CheckResult {
                name: probe.name.clone(),
                status,
                detail,
            });
        }
        checks
    }
}

/// Await `fut` unless `cancel` fires first.
async fn interruptible<T>(
    cancel: Option<&CancelToken>,
    fut: impl Future<Output = T>,
) -> Result<T, Cancelled> {
    match cancel {
        None => Ok(fut.await),
        Some(token) => {
            if token.is_cancelled() {
                return Err(Cancelled);
            }
            tokio::select! {
                value = fut => Ok(value),
                _ = token.cancelled() => Err(Cancelled),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeKind;
    use crate::executor::{CommandOutput, ExecutorError};
    use crate::types::{Environment, ImageRef, ServiceName, Version};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Answers smoke probes from a script: one exit code per call, last repeats.
    struct Scripted {
        exits: Mutex<Vec<i32>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(exits: &[i32]) -> Self {
            Self {
                exits: Mutex::new(exits.iter().rev().copied().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteExecutor for Scripted {
        async fn execute(
            &self,
            _target: &Target,
            command: &str,
            _timeout: Duration,
        ) -> Result<CommandOutput, ExecutorError> {
            self.calls.lock().push(command.to_string());
            let mut exits = self.exits.lock();
            let code = if exits.len() > 1 {
                exits.pop().unwrap()
            } else {
                exits[0]
            };
            Ok(CommandOutput {
                exit_code: code,
                stdout: String::new(),
                stderr: String::new(),
            })
        }

        async fn copy_to(
            &self,
            _target: &Target,
            _payload: &[u8],
            _remote_path: &str,
            _timeout: Duration,
        ) -> Result<(), ExecutorError> {
            Ok(())
        }
    }

    fn smoke(name: &str) -> ProbeConfig {
        ProbeConfig {
            name: name.into(),
            kind: ProbeKind::Smoke {
                command: format!("check-{}", name),
            },
        }
    }

    fn vars() -> TemplateVars {
        TemplateVars {
            service: ServiceName::new("web").unwrap(),
            image: ImageRef::parse("web").unwrap(),
            version: Version::new(1, 0, 0),
            environment: Environment::Dev,
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            interval: Duration::from_millis(1),
            probe_timeout: Duration::from_secs(1),
        }
    }

    fn target() -> Target {
        Target::local(Environment::Dev, "/tmp")
    }

    #[tokio::test]
    async fn passes_on_first_clean_cycle() {
        let executor = Scripted::new(&[0]);
        let verdict = HealthChecker::new(&executor)
            .verify(&target(), &[smoke("a"), smoke("b")], &vars(), policy(3), None)
            .await
            .unwrap();
        assert!(verdict.passed());
        assert_eq!(verdict.cycles, 1);
        assert_eq!(executor.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn failing_probe_exhausts_exactly_max_attempts() {
        // a passes, b fails, every cycle.
        let executor = Scripted::new(&[0, 1, 0, 1, 0, 1]);
        let verdict = HealthChecker::new(&executor)
            .verify(&target(), &[smoke("a"), smoke("b")], &vars(), policy(3), None)
            .await
            .unwrap();
        assert!(!verdict.passed());
        assert_eq!(verdict.cycles, 3);
        assert_eq!(executor.calls.lock().len(), 6);
        assert_eq!(verdict.checks[0].status, CheckStatus::Pass);
        assert_eq!(verdict.checks[1].status, CheckStatus::Fail);
        assert_eq!(verdict.failure_summary(), "b: exit 1");
    }

    #[tokio::test]
    async fn probes_must_pass_in_the_same_cycle() {
        // Cycle 1: a fails, b passes. Cycle 2: a passes, b fails.
        let executor = Scripted::new(&[1, 0, 0, 1]);
        let verdict = HealthChecker::new(&executor)
            .verify(&target(), &[smoke("a"), smoke("b")], &vars(), policy(2), None)
            .await
            .unwrap();
        assert!(!verdict.passed());
        assert_eq!(verdict.cycles, 2);
    }

    #[tokio::test]
    async fn recovers_on_later_cycle() {
        let executor = Scripted::new(&[1, 1, 0]);
        let verdict = HealthChecker::new(&executor)
            .verify(&target(), &[smoke("a")], &vars(), policy(5), None)
            .await
            .unwrap();
        assert!(verdict.passed());
        assert_eq!(verdict.cycles, 3);
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_retry_sleep() {
        let executor = Scripted::new(&[1]);
        let cancel = CancelToken::new();
        let slow = RetryPolicy {
            interval: Duration::from_secs(60),
            ..policy(10)
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            HealthChecker::new(&executor).verify(&target(), &[smoke("a")], &vars(), slow, Some(&cancel)),
        )
        .await
        .expect("cancellation should end verification promptly");
        assert_eq!(result, Err(Cancelled));
    }

    #[test]
    fn reduced_policy_uses_rollback_attempts() {
        let health: HealthConfig = serde_yaml::from_str(
            "max_attempts: 7\nrollback_attempts: 2\nprobes: [{ name: s, kind: smoke, command: x }]",
        )
        .unwrap();
        assert_eq!(RetryPolicy::full(&health).max_attempts, 7);
        assert_eq!(RetryPolicy::reduced(&health).max_attempts, 2);
    }

    #[tokio::test]
    async fn huge_probe_timeout_does_not_overflow() {
        let huge = RetryPolicy {
            probe_timeout: Duration::MAX,
            ..policy(1)
        };
        assert_eq!(huge.call_budget(), Duration::MAX);
        assert_eq!(policy(1).call_budget(), Duration::from_secs(6));

        let executor = Scripted::new(&[0]);
        let verdict = HealthChecker::new(&executor)
            .verify(&target(), &[smoke("api")], &vars(), huge, None)
            .await
            .unwrap();
        assert!(verdict.passed());
    }
}

// ABOUTME: DeploymentController: validate, snapshot, apply, verify, then commit or roll back.
// ABOUTME: Also runs the stand-alone rollback and status operations for an environment.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::attempt::{AttemptLog, DeploymentAttempt, Outcome};
use super::lease::{Lease, LeaseInfo};
use super::snapshot::SnapshotStore;
use super::state::{Phase, Restorable, RolledBack};
use super::transitions::{DeployContext, TerminalResult, restore_and_confirm};
use super::{DeployError, Deployment};
use crate::cancel::CancelToken;
use crate::config::{Config, EnvironmentSettings};
use crate::diagnostics::{Diagnostics, Warning, WarningKind};
use crate::error::EXIT_FAILURE;
use crate::executor::{CommandOutput, RemoteExecutor};
use crate::health::HealthVerdict;
use crate::hooks::{HookContext, HookPoint, HookRunner};
use crate::types::{Environment, IncrementKind, Version};
use crate::version::{FileVersionStore, VersionStore, next_version};

/// What to deploy where.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub environment: Environment,
    /// Deploy exactly this version.
    pub version: Option<Version>,
    /// Or compute the next version from the current one.
    pub increment: Option<IncrementKind>,
    /// Satisfies an environment's `approval: true`.
    pub approved: bool,
    /// Break a live lease held by someone else.
    pub force_lease: bool,
}

impl DeployRequest {
    pub fn increment(environment: Environment, kind: IncrementKind) -> Self {
        Self {
            environment,
            version: None,
            increment: Some(kind),
            approved: false,
            force_lease: false,
        }
    }

    pub fn exact(environment: Environment, version: Version) -> Self {
        Self {
            environment,
            version: Some(version),
            increment: None,
            approved: false,
            force_lease: false,
        }
    }

    /// Exactly one of `version` and `increment` must be set.
    pub fn validate(&self) -> Result<(), DeployError> {
        match (self.version, self.increment) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(DeployError::InvalidInput(
                "specify exactly one of a version or an increment kind".to_string(),
            )),
        }
    }
}

/// Terminal record of a run that touched live state.
#[derive(Debug)]
pub struct DeployReport {
    pub attempt: DeploymentAttempt,
    /// Verdict of the last health check that ran (forward or post-restore).
    pub verdict: Option<HealthVerdict>,
    /// Why the run did not end healthy.
    pub failure: Option<DeployError>,
    pub warnings: Vec<Warning>,
}

impl DeployReport {
    pub fn succeeded(&self) -> bool {
        self.attempt.outcome == Outcome::Healthy
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() { 0 } else { EXIT_FAILURE }
    }
}

/// Everything `status` reports about one environment.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub environment: Environment,
    pub version: Option<Version>,
    pub backup_version: Option<Version>,
    pub last_attempt: Option<DeploymentAttempt>,
    pub snapshot_version: Option<Version>,
    pub snapshot_taken_at: Option<DateTime<Utc>>,
    pub lease: Option<LeaseInfo>,
    /// Output of the `status` template, when asked for.
    pub live: Option<String>,
}

pub struct DeploymentController {
    config: Config,
    executor: Arc<dyn RemoteExecutor>,
    store: Arc<dyn VersionStore>,
    snapshots: SnapshotStore,
    attempts: AttemptLog,
    hooks: HookRunner,
    state_dir: PathBuf,
}

impl DeploymentController {
    pub fn new(config: Config, executor: Arc<dyn RemoteExecutor>) -> Self {
        let state_dir = config.state_path();
        Self {
            store: Arc::new(FileVersionStore::new(config.versions_path())),
            snapshots: SnapshotStore::new(&state_dir),
            attempts: AttemptLog::new(&state_dir),
            hooks: HookRunner::new(config.hooks_path())
                .working_dir(&config.root)
                .timeout(config.command_timeout),
            state_dir,
            config,
            executor,
        }
    }

    pub fn attempts(&self) -> &AttemptLog {
        &self.attempts
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    fn settings(&self, environment: Environment) -> Result<EnvironmentSettings, DeployError> {
        self.config
            .for_environment(environment)
            .map_err(|e| DeployError::InvalidInput(e.to_string()))
    }

    fn context<'a>(
        &'a self,
        settings: &'a EnvironmentSettings,
        cancel: &'a CancelToken,
    ) -> DeployContext<'a> {
        DeployContext {
            executor: self.executor.as_ref(),
            settings,
            store: self.store.as_ref(),
            snapshots: &self.snapshots,
            cancel,
        }
    }

    /// Run one deployment attempt.
    ///
    /// `Err` means the attempt stopped before live state was touched
    /// (rejection, conflict, unreadable state). Once anything was applied the
    /// result is a report, whose attempt says how it ended.
    pub async fn deploy(
        &self,
        request: &DeployRequest,
        cancel: &CancelToken,
    ) -> Result<DeployReport, DeployError> {
        let environment = request.environment;
        let settings = self.settings(environment)?;
        let mut diag = Diagnostics::default();

        request.validate()?;

        log_phase(environment, Phase::Idle);
        let lease = Lease::acquire(&self.state_dir, environment, request.force_lease)?;

        log_phase(environment, Phase::Validating);
        let current = self.store.load(environment)?;
        let target = match (request.version, request.increment) {
            (Some(version), _) => version,
            (None, kind) => next_version(current, kind.unwrap_or(IncrementKind::Auto))?,
        };
        let payload = self.store.record(environment)?.at_version(&target).render();

        let attempt = DeploymentAttempt::begin(environment, target, Some(current));
        tracing::info!(%environment, attempt = %attempt.id, from = %current, to = %target, "attempt started");
        self.record(&attempt, &mut diag);

        let hook_context = HookContext {
            service: settings.service.clone(),
            environment,
            version: target,
            previous_version: Some(current),
            host: settings.target.host.clone(),
        };

        if let Err(e) = self.check_policy(&settings, request, &target, &hook_context).await {
            let attempt = attempt.finish(Outcome::Failed, Some(e.to_string()));
            self.close(&attempt, lease, &mut diag);
            log_phase(environment, Phase::Failed);
            return Err(e);
        }

        let ctx = self.context(&settings, cancel);

        log_phase(environment, Phase::Snapshotting);
        let deployment = match Deployment::new(attempt, payload).snapshot(&ctx).await {
            Ok(d) => d,
            Err((attempt, e)) => {
                self.close(&attempt, lease, &mut diag);
                log_phase(environment, Phase::Failed);
                return Err(e);
            }
        };

        if cancel.is_cancelled() {
            let attempt = deployment
                .attempt
                .finish(Outcome::Failed, Some(DeployError::Cancelled.to_string()));
            self.close(&attempt, lease, &mut diag);
            log_phase(environment, Phase::Failed);
            return Err(DeployError::Cancelled);
        }

        log_phase(environment, Phase::Applying);
        let rolled_back = match deployment.apply(&ctx).await {
            Err((d, e)) => roll_back(d, &ctx, e).await,
            Ok(d) => {
                log_phase(environment, Phase::Verifying);
                match d.verify(&ctx).await {
                    Err((d, e)) => roll_back(d, &ctx, e).await,
                    Ok(d) => match d.commit(&ctx).await {
                        Err((d, e)) => roll_back(d, &ctx, e).await,
                        Ok(committed) => {
                            log_phase(environment, Phase::Committed);
                            let (attempt, verdict, warnings) = committed.finish();
                            for warning in warnings {
                                diag.warn(WarningKind::State, warning);
                            }
                            self.close(&attempt, lease, &mut diag);
                            self.run_soft_hook(HookPoint::PostDeploy, &hook_context, &mut diag)
                                .await;
                            log_phase(environment, Phase::Success);
                            return Ok(DeployReport {
                                attempt,
                                verdict: Some(verdict),
                                failure: None,
                                warnings: diag.into_warnings(),
                            });
                        }
                    },
                }
            }
        };

        // Every path that reaches here went through RollingBack.
        let (attempt, verdict, failure) = match rolled_back {
            Ok(d) => {
                let (attempt, verdict, cause) = d.finish();
                (attempt, Some(verdict), cause)
            }
            Err((attempt, e)) => (attempt, None, e),
        };
        self.close(&attempt, lease, &mut diag);
        self.run_soft_hook(HookPoint::OnError, &hook_context, &mut diag)
            .await;
        log_phase(environment, Phase::Failed);

        Ok(DeployReport {
            attempt,
            verdict,
            failure: Some(failure),
            warnings: diag.into_warnings(),
        })
    }

    /// Approval, promotion order, and the pre-deploy hook.
    async fn check_policy(
        &self,
        settings: &EnvironmentSettings,
        request: &DeployRequest,
        target: &Version,
        hook_context: &HookContext,
    ) -> Result<(), DeployError> {
        let environment = settings.environment;

        if settings.approval && !request.approved {
            return Err(DeployError::PolicyViolation(format!(
                "{} requires approval (pass --approve)",
                environment
            )));
        }

        if let Some(lower) = settings.requires {
            let live_below = match self.store.load(lower) {
                Ok(v) => Some(v),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            };
            let promoted = live_below == Some(*target) || self.attempts.has_healthy(lower, target)?;
            if !promoted {
                return Err(DeployError::PolicyViolation(format!(
                    "{} has not been deployed to {} yet",
                    target, lower
                )));
            }
        }

        if let Some(result) = self.hooks.run(HookPoint::PreDeploy, hook_context).await
            && !result.succeeded()
        {
            let detail = result.stderr.trim();
            return Err(DeployError::PolicyViolation(if detail.is_empty() {
                "pre-deploy hook failed".to_string()
            } else {
                format!("pre-deploy hook failed: {}", detail)
            }));
        }

        Ok(())
    }

    /// Re-apply the environment's last-known-good snapshot and confirm it.
    pub async fn rollback(
        &self,
        environment: Environment,
        force_lease: bool,
    ) -> Result<DeployReport, DeployError> {
        let settings = self.settings(environment)?;
        let mut diag = Diagnostics::default();
        let lease = Lease::acquire(&self.state_dir, environment, force_lease)?;

        let snapshot = self.snapshots.load(environment)?.ok_or_else(|| {
            DeployError::Snapshot(format!("no known-good snapshot recorded for {}", environment))
        })?;

        let current = match self.store.load(environment) {
            Ok(v) => Some(v),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        let attempt = DeploymentAttempt::begin(environment, snapshot.version, current);
        tracing::info!(%environment, attempt = %attempt.id, to = %snapshot.version, "manual rollback started");
        self.record(&attempt, &mut diag);

        // The record has to name the version being restored before the
        // restored state is captured and compared.
        if current != Some(snapshot.version) {
            if let Err(e) = self.store.save(environment, &snapshot.version) {
                let attempt = attempt.finish(Outcome::Failed, Some(e.to_string()));
                self.close(&attempt, lease, &mut diag);
                return Err(e.into());
            }
        }

        log_phase(environment, Phase::RollingBack);
        let never = CancelToken::new();
        let ctx = self.context(&settings, &never);
        let hook_context = HookContext {
            service: settings.service.clone(),
            environment,
            version: snapshot.version,
            previous_version: current,
            host: settings.target.host.clone(),
        };

        let report = match restore_and_confirm(&ctx, &snapshot).await {
            Ok(verdict) => {
                let attempt = attempt.finish(
                    Outcome::Healthy,
                    Some(format!("restored snapshot taken {}", snapshot.taken_at)),
                );
                self.close(&attempt, lease, &mut diag);
                log_phase(environment, Phase::Success);
                DeployReport {
                    attempt,
                    verdict: Some(verdict),
                    failure: None,
                    warnings: Vec::new(),
                }
            }
            Err(e) => {
                let reason = match current {
                    Some(previous) if previous != snapshot.version => format!(
                        "{}; version record was moved from {} to {} before the restore, live state unverified",
                        e, previous, snapshot.version
                    ),
                    _ => e.to_string(),
                };
                let attempt = attempt.escalate(reason);
                self.close(&attempt, lease, &mut diag);
                self.run_soft_hook(HookPoint::OnError, &hook_context, &mut diag)
                    .await;
                log_phase(environment, Phase::Failed);
                DeployReport {
                    attempt,
                    verdict: None,
                    failure: Some(e),
                    warnings: Vec::new(),
                }
            }
        };

        Ok(DeployReport {
            warnings: diag.into_warnings(),
            ..report
        })
    }

    /// Current version, backup, last attempt, snapshot and lease holder.
    pub async fn status(
        &self,
        environment: Environment,
        live: bool,
    ) -> Result<EnvironmentStatus, DeployError> {
        let version = match self.store.load(environment) {
            Ok(v) => Some(v),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        let backup_version = self.store.load_backup(environment)?;
        let snapshot = self.snapshots.load(environment)?;

        let live = if live {
            let settings = self.settings(environment)?;
            let vars = settings.vars(version.unwrap_or(Version::new(0, 0, 0)));
            let output: CommandOutput = self
                .executor
                .execute(
                    &settings.target,
                    &vars.render(&settings.commands.status),
                    settings.command_timeout,
                )
                .await?;
            Some(output.stdout.trim_end().to_string())
        } else {
            None
        };

        Ok(EnvironmentStatus {
            environment,
            version,
            backup_version,
            last_attempt: self.attempts.last(environment)?,
            snapshot_version: snapshot.as_ref().map(|s| s.version),
            snapshot_taken_at: snapshot.as_ref().map(|s| s.taken_at),
            lease: LeaseInfo::read(&self.state_dir, environment),
            live,
        })
    }

    /// Append an attempt record; a failure to do so is only a warning.
    fn record(&self, attempt: &DeploymentAttempt, diag: &mut Diagnostics) {
        if let Err(e) = self.attempts.append(attempt) {
            diag.warn(
                WarningKind::State,
                format!("attempt {} not recorded: {}", attempt.id, e),
            );
        }
    }

    /// Record the terminal attempt, then release the lease.
    fn close(&self, attempt: &DeploymentAttempt, lease: Lease, diag: &mut Diagnostics) {
        tracing::info!(
            environment = %attempt.environment,
            attempt = %attempt.id,
            outcome = %attempt.outcome,
            escalated = attempt.escalated,
            reason = attempt.reason.as_deref().unwrap_or(""),
            "attempt finished"
        );
        self.record(attempt, diag);
        if let Err(e) = lease.release() {
            diag.warn(
                WarningKind::Lease,
                format!("failed to release lease for {}: {}", attempt.environment, e),
            );
        }
    }

    async fn run_soft_hook(&self, point: HookPoint, context: &HookContext, diag: &mut Diagnostics) {
        if let Some(result) = self.hooks.run(point, context).await
            && !result.succeeded()
        {
            diag.warn(
                WarningKind::Hook,
                format!(
                    "{} hook failed (exit {:?}): {}",
                    point.filename(),
                    result.status,
                    result.stderr.trim()
                ),
            );
        }
    }
}

async fn roll_back<S: Restorable>(
    deployment: Deployment<S>,
    ctx: &DeployContext<'_>,
    cause: DeployError,
) -> TerminalResult<RolledBack> {
    log_phase(deployment.environment(), Phase::RollingBack);
    deployment.rollback(ctx, cause).await
}

fn log_phase(environment: Environment, phase: Phase) {
    tracing::info!(%environment, %phase, "deployment phase");
}

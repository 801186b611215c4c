// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state, or self plus the error for rollback.

use chrono::Utc;

use super::Deployment;
use super::apply::apply_release;
use super::attempt::{DeploymentAttempt, Outcome};
use super::error::DeployError;
use super::snapshot::{RollbackManager, Snapshot, SnapshotStore};
use super::state::{Applied, Committed, Restorable, RolledBack, Snapshotted, Validated, Verified};
use crate::cancel::CancelToken;
use crate::config::{EnvironmentSettings, ProbeConfig};
use crate::executor::RemoteExecutor;
use crate::health::{HealthChecker, HealthVerdict, RetryPolicy};
use crate::version::VersionStore;

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

/// Result of a step after which the attempt is over either way.
pub type TerminalResult<T> = Result<Deployment<T>, (DeploymentAttempt, DeployError)>;

/// Collaborators every transition needs.
pub struct DeployContext<'a> {
    pub executor: &'a dyn RemoteExecutor,
    pub settings: &'a EnvironmentSettings,
    pub store: &'a dyn VersionStore,
    pub snapshots: &'a SnapshotStore,
    pub cancel: &'a CancelToken,
}

impl DeployContext<'_> {
    fn rollback_manager(&self) -> RollbackManager<'_> {
        RollbackManager::new(self.executor, self.settings, self.store)
    }

    fn probes(&self) -> Vec<ProbeConfig> {
        self.settings.health.probes.iter().cloned().collect()
    }
}

// =============================================================================
// Validated -> Snapshotted
// =============================================================================

impl Deployment<Validated> {
    /// Capture the current live state before anything is mutated.
    ///
    /// Failure here aborts the attempt; there is nothing to roll back.
    #[must_use = "deployment state must be used"]
    pub async fn snapshot(self, ctx: &DeployContext<'_>) -> TerminalResult<Snapshotted> {
        let snapshot = match ctx.rollback_manager().capture().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let reason = format!("snapshot failed: {}", e);
                return Err((self.attempt.finish(Outcome::Failed, Some(reason)), e));
            }
        };

        if let Err(e) = ctx.snapshots.save_if_absent(&snapshot) {
            let reason = e.to_string();
            return Err((self.attempt.finish(Outcome::Failed, Some(reason)), e));
        }

        let payload = self.state.payload.clone();
        Ok(self.transition(Snapshotted { snapshot, payload }))
    }
}

// =============================================================================
// Snapshotted -> Applied
// =============================================================================

impl Deployment<Snapshotted> {
    /// Ship the configuration and run stop, apply and start.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    #[must_use = "deployment state must be used"]
    pub async fn apply(self, ctx: &DeployContext<'_>) -> TransitionResult<Applied, Snapshotted> {
        let result = apply_release(
            ctx.executor,
            ctx.settings,
            self.attempt.target_version,
            self.state.payload.as_bytes(),
            Some(ctx.cancel),
        )
        .await;

        match result {
            Ok(()) => {
                let Snapshotted { snapshot, payload } = self.state;
                Ok(Deployment {
                    attempt: self.attempt,
                    state: Applied { snapshot, payload },
                })
            }
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// Applied -> Verified
// =============================================================================

impl Deployment<Applied> {
    /// Run the full checklist against the new version.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on a failed verdict or cancellation.
    #[must_use = "deployment state must be used"]
    pub async fn verify(mut self, ctx: &DeployContext<'_>) -> TransitionResult<Verified, Applied> {
        let vars = ctx.settings.vars(self.attempt.target_version);
        let result = HealthChecker::new(ctx.executor)
            .verify(
                &ctx.settings.target,
                &ctx.probes(),
                &vars,
                RetryPolicy::full(&ctx.settings.health),
                Some(ctx.cancel),
            )
            .await;

        let verdict = match result {
            Ok(verdict) => verdict,
            Err(_) => return Err((self, DeployError::Cancelled)),
        };
        self.attempt.probe_cycles = verdict.cycles;

        if !verdict.passed() {
            let summary = format!(
                "{} after {} attempt(s)",
                verdict.failure_summary(),
                verdict.cycles
            );
            return Err((self, DeployError::HealthCheck(summary)));
        }

        let Applied { snapshot, payload } = self.state;
        Ok(Deployment {
            attempt: self.attempt,
            state: Verified {
                snapshot,
                payload,
                verdict,
            },
        })
    }
}

// =============================================================================
// Verified -> Committed
// =============================================================================

impl Deployment<Verified> {
    /// Persist the new version and make its state the last known good.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` if the version record cannot be saved; the
    /// live state is then rolled back to keep record and target in step.
    #[must_use = "deployment state must be used"]
    pub async fn commit(self, ctx: &DeployContext<'_>) -> TransitionResult<Committed, Verified> {
        let environment = self.attempt.environment;
        let version = self.attempt.target_version;

        if let Err(e) = ctx.store.save(environment, &version) {
            return Err((self, e.into()));
        }

        let mut warnings = Vec::new();
        let snapshot = Snapshot {
            environment,
            version,
            taken_at: Utc::now(),
            configuration: self.state.payload.clone(),
        };
        if let Err(e) = ctx.snapshots.save(&snapshot) {
            warnings.push(format!("last-known-good snapshot not updated: {}", e));
        }

        let verdict = self.state.verdict;
        Ok(Deployment {
            attempt: self.attempt,
            state: Committed { verdict, warnings },
        })
    }
}

impl Deployment<Committed> {
    /// Close the attempt as healthy.
    pub fn finish(self) -> (DeploymentAttempt, HealthVerdict, Vec<String>) {
        let attempt = self.attempt.finish(Outcome::Healthy, None);
        (attempt, self.state.verdict, self.state.warnings)
    }
}

// =============================================================================
// Any snapshotted state -> RolledBack
// =============================================================================

impl<S: Restorable> Deployment<S> {
    /// Restore the pre-attempt snapshot, then confirm it with the reduced
    /// checklist and a fresh capture.
    ///
    /// Not retried and not cancellable. If any part fails the attempt ends
    /// `failed` with the escalation flag set.
    #[must_use = "deployment state must be used"]
    pub async fn rollback(
        self,
        ctx: &DeployContext<'_>,
        cause: DeployError,
    ) -> TerminalResult<RolledBack> {
        tracing::warn!(
            environment = %self.attempt.environment,
            attempt = %self.attempt.id,
            "rolling back: {}",
            cause
        );

        match restore_and_confirm(ctx, self.state.snapshot()).await {
            Ok(verdict) => {
                let reason = cause.to_string();
                let attempt = self.attempt.finish(Outcome::RolledBack, Some(reason));
                Ok(Deployment {
                    attempt,
                    state: RolledBack { cause, verdict },
                })
            }
            Err(e) => {
                let reason = format!("{}; {}", cause, e);
                tracing::error!(environment = %self.attempt.environment, "{}", reason);
                Err((self.attempt.escalate(reason), e))
            }
        }
    }
}

impl Deployment<RolledBack> {
    /// Close out a rolled back attempt, returning what caused it.
    pub fn finish(self) -> (DeploymentAttempt, HealthVerdict, DeployError) {
        (self.attempt, self.state.verdict, self.state.cause)
    }
}

/// Re-apply `snapshot`, run the reduced checklist, and check the live state
/// now equals the snapshot. Every failure is reported as a rollback failure.
pub(crate) async fn restore_and_confirm(
    ctx: &DeployContext<'_>,
    snapshot: &Snapshot,
) -> Result<HealthVerdict, DeployError> {
    let manager = ctx.rollback_manager();

    manager
        .restore(snapshot)
        .await
        .map_err(|e| DeployError::Rollback(format!("restore of {} failed: {}", snapshot.version, e)))?;

    let verdict = HealthChecker::new(ctx.executor)
        .verify(
            &ctx.settings.target,
            &ctx.probes(),
            &ctx.settings.vars(snapshot.version),
            RetryPolicy::reduced(&ctx.settings.health),
            None,
        )
        .await
        .map_err(|e| DeployError::Rollback(e.to_string()))?;
    if !verdict.passed() {
        return Err(DeployError::Rollback(format!(
            "restored {} is unhealthy: {}",
            snapshot.version,
            verdict.failure_summary()
        )));
    }

    let live = manager
        .capture()
        .await
        .map_err(|e| DeployError::Rollback(format!("cannot confirm restored state: {}", e)))?;
    if !live.same_state(snapshot) {
        return Err(DeployError::Rollback(format!(
            "live state after restore does not match snapshot of {}",
            snapshot.version
        )));
    }

    tracing::info!(environment = %snapshot.environment, version = %snapshot.version, "snapshot restored");
    Ok(verdict)
}

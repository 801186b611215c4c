// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: Owns the attempt record for the duration of one run.

use super::attempt::DeploymentAttempt;
use super::state::Validated;
use crate::types::Environment;

/// A deployment in progress, parameterized by its current state.
///
/// The state type parameter `S` carries state-specific data (snapshot,
/// payload, verdict) so that, for example, a rollback can only be requested
/// once a snapshot exists.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) attempt: DeploymentAttempt,
    pub(crate) state: S,
}

impl Deployment<Validated> {
    pub(crate) fn new(attempt: DeploymentAttempt, payload: String) -> Self {
        Deployment {
            attempt,
            state: Validated { payload },
        }
    }
}

impl<S> Deployment<S> {
    pub fn environment(&self) -> Environment {
        self.attempt.environment
    }

    pub(crate) fn transition<T>(self, state: T) -> Deployment<T> {
        Deployment {
            attempt: self.attempt,
            state,
        }
    }
}

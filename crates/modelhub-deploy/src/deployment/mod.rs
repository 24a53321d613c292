//! Deployment lifecycle orchestration.

mod manager;
mod task;

pub use manager::{DeploymentDetail, DeploymentManager, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, HubResult};
use crate::events::EventLog;
use crate::locks::DeploymentLocks;
use crate::provisioner::Provisioner;
use crate::store::{DeploymentStore, ModelCatalog};
use crate::types::{DeploymentId, DeploymentRecord, UserId};

/// Lifecycle action dispatched through the actions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentAction {
    /// Start the deployment.
    Start,
    /// Stop the deployment.
    Stop,
    /// Stop then start the deployment.
    Restart,
}

impl DeploymentAction {
    /// Get the action name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A provisioning attempt that has been scheduled and not yet finished.
#[derive(Debug)]
struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

/// State shared between the manager and its provisioning tasks.
struct LifecycleContext {
    store: Arc<dyn DeploymentStore>,
    catalog: Arc<dyn ModelCatalog>,
    provisioner: Arc<dyn Provisioner>,
    events: EventLog,
    locks: DeploymentLocks,
    in_flight: DashMap<DeploymentId, InFlight>,
}

impl LifecycleContext {
    /// Fetch a deployment, hiding ones owned by someone else.
    async fn fetch_owned(&self, id: DeploymentId, owner: UserId) -> HubResult<DeploymentRecord> {
        match self.store.get(id).await? {
            Some(record) if record.owner_id == owner => Ok(record),
            _ => Err(HubError::not_found(format!("deployment {id}"))),
        }
    }

    /// Take the deployment's lock and fetch it, hiding ones owned by someone
    /// else.
    ///
    /// Ownership is checked before locking so unknown ids never leave an
    /// entry in the lock table.
    async fn lock_owned(
        &self,
        id: DeploymentId,
        owner: UserId,
    ) -> HubResult<(OwnedMutexGuard<()>, DeploymentRecord)> {
        self.fetch_owned(id, owner).await?;

        let guard = self.locks.acquire(id).await;
        match self.fetch_owned(id, owner).await {
            Ok(record) => Ok((guard, record)),
            Err(e) => {
                // Deleted while we waited
                drop(guard);
                self.locks.forget_idle(id);
                Err(e)
            }
        }
    }

    /// Cancel any in-flight attempt for `id`.
    fn cancel_in_flight(&self, id: DeploymentId) {
        if let Some((_, attempt)) = self.in_flight.remove(&id) {
            attempt.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parses_lowercase() {
        let action: DeploymentAction = serde_json::from_str(r#""restart""#).unwrap();
        assert_eq!(action, DeploymentAction::Restart);
        assert!(serde_json::from_str::<DeploymentAction>(r#""explode""#).is_err());
    }
}

//! Per-deployment write serialisation.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::DeploymentId;

/// One async mutex per deployment.
///
/// Every read-modify-write of a deployment record happens while holding its
/// guard, so request handlers and provisioning tasks never interleave.
#[derive(Debug, Default)]
pub struct DeploymentLocks {
    locks: DashMap<DeploymentId, Arc<Mutex<()>>>,
}

impl DeploymentLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a deployment.
    pub async fn acquire(&self, id: DeploymentId) -> OwnedMutexGuard<()> {
        // Clone out of the map before awaiting so no shard lock is held.
        let lock = Arc::clone(self.locks.entry(id).or_default().value());
        lock.lock_owned().await
    }

    /// Drop the lock entry for a deleted deployment.
    pub fn forget(&self, id: DeploymentId) {
        self.locks.remove(&id);
    }

    /// Drop the lock entry if no guard or waiter still references it.
    ///
    /// Call after releasing a guard taken for an id that turned out not to
    /// exist.
    pub fn forget_idle(&self, id: DeploymentId) {
        self.locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of tracked deployments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no deployment has been locked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

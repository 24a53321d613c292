//! Common test utilities for deployment integration tests.

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use modelhub_deploy::{
    api::{self, AppState},
    config::{AuthConfig, LogsConfig, ProvisioningConfig},
    Authenticator, DeploymentId, DeploymentManager, DeploymentRecord, DeploymentStatus,
    DeploymentStore, HubError, HubResult, MemoryStore, Model, ModelVersion, ProvisionPlan,
    Provisioner, SimulatedProvisioner, UserId,
};

/// Owner of the seeded model.
pub const OWNER: UserId = UserId::new(1);
/// A second user with no models.
pub const STRANGER: UserId = UserId::new(2);

/// Complete test hub setup with all components wired together.
pub struct TestHub {
    pub store: Arc<MemoryStore>,
    pub manager: Arc<DeploymentManager>,
    pub auth: Authenticator,
    pub model: Model,
    pub version: ModelVersion,
}

impl TestHub {
    /// Creates a hub whose simulated provisioner finishes in a few milliseconds.
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(5))
    }

    /// Creates a hub whose simulated provisioner takes `delay` for every kind.
    pub fn with_delay(delay: Duration) -> Self {
        let provisioner = Arc::new(SimulatedProvisioner::new(&ProvisioningConfig::uniform(
            delay,
        )));
        Self::with_provisioner(provisioner)
    }

    /// Creates a hub with a custom provisioner.
    pub fn with_provisioner(provisioner: Arc<dyn Provisioner>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let model = store.add_model(OWNER, "resnet", "pytorch").unwrap();
        let version = store.add_version(model.id, "1.0.0", "s3://models/resnet/1").unwrap();

        let manager = Arc::new(DeploymentManager::new(
            store.clone(),
            store.clone(),
            provisioner,
            LogsConfig::default(),
        ));

        Self {
            store,
            manager,
            auth: Authenticator::new(&AuthConfig::default()),
            model,
            version,
        }
    }

    /// HTTP router over this hub.
    pub fn app(&self) -> Router {
        let store: Arc<dyn DeploymentStore> = self.store.clone();
        api::router(
            AppState {
                manager: Arc::clone(&self.manager),
                store,
                auth: self.auth.clone(),
            },
            Duration::from_secs(5),
        )
    }

    /// Bearer header value for `user`.
    pub fn bearer(&self, user: UserId) -> String {
        let token = self.auth.issue(user, Duration::from_secs(600)).unwrap();
        format!("Bearer {token}")
    }

    /// Polls until the deployment reaches `status`, panicking after two seconds.
    pub async fn wait_for_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
    ) -> DeploymentRecord {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let record = self.store.get(id).await.unwrap().expect("deployment vanished");
            if record.status == status {
                return record;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "deployment {id} stuck in {} waiting for {status}",
                record.status
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Waits until no provisioning attempt is in flight.
    pub async fn wait_idle(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.manager.in_flight() > 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "provisioning never settled"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Provisioner that always fails with the given reason.
pub struct FailingProvisioner {
    pub reason: &'static str,
}

#[async_trait]
impl Provisioner for FailingProvisioner {
    async fn provision(&self, _plan: &ProvisionPlan) -> HubResult<String> {
        Err(HubError::internal(self.reason))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

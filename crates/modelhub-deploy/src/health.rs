//! Background health monitor for running deployments.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deployment::DeploymentManager;

/// Periodically records a health check against every running deployment.
///
/// The probe is simulated: no request is sent to the deployment's
/// `health_check_path`, only `last_health_check` is stamped.
#[derive(Debug)]
pub struct HealthMonitor {
    manager: Arc<DeploymentManager>,
    interval: Duration,
}

impl HealthMonitor {
    /// Create a monitor that sweeps every `interval`.
    pub fn new(manager: Arc<DeploymentManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Run sweeps until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "health monitor started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.manager.record_health_checks().await {
                        Ok(checked) => debug!(checked, "health sweep complete"),
                        Err(e) => warn!(error = %e, "health sweep failed"),
                    }
                }
            }
        }

        info!("health monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogsConfig, ProvisioningConfig};
    use crate::provisioner::SimulatedProvisioner;
    use crate::store::MemoryStore;
    use crate::types::{DeploymentKind, DeploymentSpec, DeploymentStatus, UserId};

    #[tokio::test]
    async fn stamps_running_deployments_until_cancelled() {
        let store = Arc::new(MemoryStore::new());
        let owner = UserId::new(1);
        let model = store.add_model(owner, "resnet", "pytorch").unwrap();
        store.add_version(model.id, "1", "s3://m/1").unwrap();

        let manager = Arc::new(DeploymentManager::new(
            store.clone(),
            store.clone(),
            Arc::new(SimulatedProvisioner::new(&ProvisioningConfig::uniform(
                Duration::from_millis(1),
            ))),
            LogsConfig::default(),
        ));

        let record = manager
            .create(
                owner,
                DeploymentSpec::new("svc", DeploymentKind::Serverless, model.id),
            )
            .await
            .unwrap();
        for _ in 0..200 {
            if manager.get(owner, record.id).await.unwrap().status == DeploymentStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let cancel = CancellationToken::new();
        let monitor = HealthMonitor::new(Arc::clone(&manager), Duration::from_millis(10));
        let handle = tokio::spawn(monitor.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        let metrics = manager.metrics(owner, record.id).await.unwrap();
        assert!(metrics.last_health_check.is_some());
    }
}

//! Simulated provisioning backends.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ProvisioningConfig;
use crate::error::HubResult;
use crate::types::{DeploymentId, DeploymentKind};

use super::{ProvisionPlan, Provisioner};

/// Provisioner that sleeps for a per-kind delay and returns a templated URL.
///
/// Nothing is built or served; the URL is deterministic in the deployment ID
/// and kind.
#[derive(Debug, Clone)]
pub struct SimulatedProvisioner {
    container_delay: Duration,
    serverless_delay: Duration,
    endpoint_delay: Duration,
    base_domain: String,
}

impl SimulatedProvisioner {
    /// Create a provisioner from configuration.
    #[must_use]
    pub fn new(config: &ProvisioningConfig) -> Self {
        Self {
            container_delay: Duration::from_millis(config.container_delay_ms),
            serverless_delay: Duration::from_millis(config.serverless_delay_ms),
            endpoint_delay: Duration::from_millis(config.endpoint_delay_ms),
            base_domain: config.base_domain.clone(),
        }
    }

    /// Simulated time to provision a deployment of `kind`.
    #[must_use]
    pub const fn delay(&self, kind: DeploymentKind) -> Duration {
        match kind {
            DeploymentKind::Container => self.container_delay,
            DeploymentKind::Serverless => self.serverless_delay,
            DeploymentKind::Endpoint => self.endpoint_delay,
        }
    }

    /// Endpoint URL for a deployment.
    #[must_use]
    pub fn endpoint_url(&self, id: DeploymentId, kind: DeploymentKind) -> String {
        let subdomain = match kind {
            DeploymentKind::Container => "api",
            DeploymentKind::Serverless => "serverless",
            DeploymentKind::Endpoint => "endpoint",
        };
        format!(
            "https://{subdomain}.{}/v1/deployments/{id}/predict",
            self.base_domain
        )
    }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
    async fn provision(&self, plan: &ProvisionPlan) -> HubResult<String> {
        let delay = self.delay(plan.kind);
        debug!(
            deployment_id = %plan.deployment_id,
            kind = %plan.kind,
            artifact = %plan.artifact_path,
            delay = ?delay,
            "simulating provisioning"
        );

        tokio::time::sleep(delay).await;

        Ok(self.endpoint_url(plan.deployment_id, plan.kind))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

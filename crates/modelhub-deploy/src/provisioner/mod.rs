//! Endpoint provisioning.
//!
//! A provisioner turns a [`ProvisionPlan`] into a live endpoint URL. The only
//! implementation simulates the container, serverless and dedicated endpoint
//! backends with fixed, kind-specific delays.

mod simulated;

pub use simulated::SimulatedProvisioner;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ProvisioningConfig;
use crate::error::HubResult;
use crate::types::{
    DeploymentId, DeploymentKind, DeploymentRecord, EnvVars, Model, ModelVersion, ResourceLimits,
};

/// Kind-specific platform settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PlatformConfig {
    /// Container image behind a load balancer.
    Container {
        /// Port the model server listens on.
        port: u16,
        /// Registry images are pushed to.
        registry: String,
    },
    /// Serverless function.
    Serverless {
        /// Function runtime.
        runtime: String,
        /// Invocation timeout in seconds.
        timeout_secs: u32,
        /// Function memory in MB.
        memory_mb: u32,
    },
    /// Dedicated inference endpoint.
    Endpoint {
        /// Instance size.
        instance_type: String,
    },
}

impl PlatformConfig {
    /// Defaults for a deployment kind.
    #[must_use]
    pub fn for_kind(kind: DeploymentKind) -> Self {
        match kind {
            DeploymentKind::Container => Self::Container {
                port: 8080,
                registry: "docker.io".to_owned(),
            },
            DeploymentKind::Serverless => Self::Serverless {
                runtime: "python3.9".to_owned(),
                timeout_secs: 30,
                memory_mb: 256,
            },
            DeploymentKind::Endpoint => Self::Endpoint {
                instance_type: "small".to_owned(),
            },
        }
    }
}

/// Everything a provisioner needs for one attempt.
///
/// Built fresh from the current record and model version on every attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionPlan {
    /// Deployment being provisioned.
    pub deployment_id: DeploymentId,
    /// Deployment name.
    pub name: String,
    /// How the deployment is served.
    pub kind: DeploymentKind,
    /// Where the model artifact is stored.
    pub artifact_path: String,
    /// Model framework.
    pub framework: String,
    /// Resource limits.
    pub resources: ResourceLimits,
    /// Environment variables.
    pub env: EnvVars,
    /// Path probed by health checks.
    pub health_check_path: String,
    /// Kind-specific platform settings.
    pub platform: PlatformConfig,
}

impl ProvisionPlan {
    /// Snapshot a deployment and its resolved model version.
    #[must_use]
    pub fn new(record: &DeploymentRecord, model: &Model, version: &ModelVersion) -> Self {
        Self {
            deployment_id: record.id,
            name: record.name.clone(),
            kind: record.kind,
            artifact_path: version.artifact_path.clone(),
            framework: model.framework.clone(),
            resources: record.resources,
            env: record.env.clone(),
            health_check_path: record.health_check_path.clone(),
            platform: PlatformConfig::for_kind(record.kind),
        }
    }
}

/// Trait for endpoint provisioning implementations.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision the plan and return the public endpoint URL.
    ///
    /// Must be cancel-safe: the caller may drop the future at any await point.
    async fn provision(&self, plan: &ProvisionPlan) -> HubResult<String>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Create a provisioner from configuration.
pub fn create_provisioner(config: &ProvisioningConfig) -> Arc<dyn Provisioner> {
    Arc::new(SimulatedProvisioner::new(config))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::{
        DeploymentDraft, DeploymentSpec, ModelId, ModelVersionId, UserId,
    };

    #[test]
    fn plan_snapshots_record_and_version() {
        let mut spec = DeploymentSpec::new("svc", DeploymentKind::Serverless, ModelId::new(7));
        spec.env = [("MODE", "fast")].into_iter().collect();
        let record = DeploymentDraft::new(UserId::new(1), spec, ModelVersionId::new(3))
            .into_record(DeploymentId::new(5));
        let model = Model {
            id: ModelId::new(7),
            owner_id: UserId::new(1),
            name: "resnet".to_owned(),
            framework: "pytorch".to_owned(),
        };
        let version = ModelVersion {
            id: ModelVersionId::new(3),
            model_id: ModelId::new(7),
            version: "1.0.0".to_owned(),
            artifact_path: "s3://models/resnet/1.0.0".to_owned(),
            created_at: Utc::now(),
        };

        let plan = ProvisionPlan::new(&record, &model, &version);
        assert_eq!(plan.artifact_path, "s3://models/resnet/1.0.0");
        assert_eq!(plan.framework, "pytorch");
        assert_eq!(plan.env.get("MODE"), Some("fast"));
        assert_eq!(
            plan.platform,
            PlatformConfig::Serverless {
                runtime: "python3.9".to_owned(),
                timeout_secs: 30,
                memory_mb: 256,
            }
        );
    }

    #[test]
    fn platform_serialises_tagged() {
        let json = serde_json::to_value(PlatformConfig::for_kind(DeploymentKind::Container))
            .unwrap();
        assert_eq!(json["platform"], "container");
        assert_eq!(json["port"], 8080);
        assert_eq!(json["registry"], "docker.io");
    }
}

//! Test fixtures for deployment integration tests.

use modelhub_deploy::{DeploymentKind, DeploymentSpec, ModelId, ModelVersionId};
use serde_json::{json, Value};

/// Builder for creating test DeploymentSpec instances.
pub struct SpecBuilder {
    spec: DeploymentSpec,
}

impl SpecBuilder {
    /// Creates a serverless spec for `model_id` with the given name.
    pub fn new(name: &str, model_id: ModelId) -> Self {
        Self {
            spec: DeploymentSpec::new(name, DeploymentKind::Serverless, model_id),
        }
    }

    /// Sets the deployment kind.
    pub fn kind(mut self, kind: DeploymentKind) -> Self {
        self.spec.kind = kind;
        self
    }

    /// Pins a model version.
    pub fn version(mut self, version_id: ModelVersionId) -> Self {
        self.spec.model_version_id = Some(version_id);
        self
    }

    /// Sets the replica bounds.
    pub fn replicas(mut self, min: u32, max: u32) -> Self {
        self.spec.resources.min_replicas = min;
        self.spec.resources.max_replicas = max;
        self
    }

    /// Builds the `DeploymentSpec`.
    pub fn build(self) -> DeploymentSpec {
        self.spec
    }
}

/// JSON body for a create request.
pub fn create_body(name: &str, model_id: ModelId) -> Value {
    json!({
        "name": name,
        "kind": "serverless",
        "model_id": model_id,
    })
}

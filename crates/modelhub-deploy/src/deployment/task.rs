//! Background provisioning task.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{HubError, HubResult};
use crate::events::COMPONENT_DEPLOYER;
use crate::provisioner::ProvisionPlan;
use crate::state::Transition;
use crate::types::{DeploymentId, DeploymentRecord, EventLevel};

use super::LifecycleContext;

/// One provisioning attempt for one deployment generation.
///
/// Every status write happens under the deployment's lock and only while the
/// attempt is still current: not cancelled, record present and generation
/// unchanged. A superseded or stopped attempt therefore never writes.
pub(super) struct ProvisioningTask {
    ctx: Arc<LifecycleContext>,
    id: DeploymentId,
    generation: u64,
    cancel: CancellationToken,
}

impl ProvisioningTask {
    pub(super) fn new(
        ctx: Arc<LifecycleContext>,
        id: DeploymentId,
        generation: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            id,
            generation,
            cancel,
        }
    }

    /// Drive the attempt to a terminal state, or stop quietly if superseded.
    pub(super) async fn run(self) {
        debug!(
            deployment_id = %self.id,
            generation = self.generation,
            "provisioning task started"
        );

        if let Err(e) = self.execute().await {
            error!(
                deployment_id = %self.id,
                generation = self.generation,
                error = %e,
                "provisioning task aborted"
            );
        }

        self.ctx
            .in_flight
            .remove_if(&self.id, |_, attempt| attempt.generation == self.generation);
    }

    async fn execute(&self) -> HubResult<()> {
        let Some(record) = self
            .advance(
                Transition::StartBuilding,
                EventLevel::Info,
                "Starting model deployment process".to_owned(),
                json!({ "generation": self.generation }),
            )
            .await?
        else {
            return Ok(());
        };

        let plan = match self.plan(&record).await {
            Ok(plan) => plan,
            Err(e) => return self.fail(&e).await,
        };

        let metadata = serde_json::to_value(&plan)
            .map_err(|e| HubError::Serialisation(format!("failed to serialise plan: {e}")))?;
        let message = format!(
            "Provisioning {} deployment with {} provisioner",
            plan.kind,
            self.ctx.provisioner.name()
        );
        if self
            .advance(Transition::StartDeploying, EventLevel::Info, message, metadata)
            .await?
            .is_none()
        {
            return Ok(());
        }

        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!(deployment_id = %self.id, generation = self.generation, "provisioning cancelled");
                return Ok(());
            }
            result = self.ctx.provisioner.provision(&plan) => result,
        };

        match result {
            Ok(endpoint_url) => {
                let message = format!("Deployment successful. Endpoint: {endpoint_url}");
                let metadata = json!({ "endpoint_url": endpoint_url });
                self.advance(
                    Transition::Run { endpoint_url },
                    EventLevel::Info,
                    message,
                    metadata,
                )
                .await?;
                Ok(())
            }
            Err(e) => self.fail(&e).await,
        }
    }

    /// Build a fresh provisioning plan from the current record.
    async fn plan(&self, record: &DeploymentRecord) -> HubResult<ProvisionPlan> {
        let version = self
            .ctx
            .catalog
            .get_version(record.model_version_id)
            .await?
            .ok_or_else(|| HubError::internal("Model version not found"))?;

        let model = self
            .ctx
            .catalog
            .get_model(version.model_id)
            .await?
            .ok_or_else(|| HubError::internal("Model not found"))?;

        Ok(ProvisionPlan::new(record, &model, &version))
    }

    async fn fail(&self, err: &HubError) -> HubResult<()> {
        let reason = failure_reason(err);
        warn!(deployment_id = %self.id, error = %reason, "provisioning failed");

        let message = format!("Deployment failed: {reason}");
        let metadata = json!({ "error": reason });
        self.advance(
            Transition::Fail { error: reason },
            EventLevel::Error,
            message,
            metadata,
        )
        .await?;
        Ok(())
    }

    /// Commit a transition if this attempt is still current.
    ///
    /// Returns `None` when the attempt has been superseded, stopped or
    /// deleted, in which case nothing is written.
    async fn advance(
        &self,
        transition: Transition,
        level: EventLevel,
        message: String,
        metadata: Value,
    ) -> HubResult<Option<DeploymentRecord>> {
        let guard = self.ctx.locks.acquire(self.id).await;

        if self.cancel.is_cancelled() {
            debug!(deployment_id = %self.id, generation = self.generation, "attempt cancelled");
            // May have been cancelled by a delete that already forgot the entry
            drop(guard);
            self.ctx.locks.forget_idle(self.id);
            return Ok(None);
        }

        let Some(mut record) = self.ctx.store.get(self.id).await? else {
            debug!(deployment_id = %self.id, "deployment deleted during provisioning");
            drop(guard);
            self.ctx.locks.forget_idle(self.id);
            return Ok(None);
        };

        if record.generation != self.generation {
            warn!(
                deployment_id = %self.id,
                captured = self.generation,
                current = record.generation,
                "discarding stale provisioning update"
            );
            return Ok(None);
        }

        record.apply(transition)?;
        self.ctx.store.update(&record).await?;
        self.ctx
            .events
            .append(self.id, level, COMPONENT_DEPLOYER, message, metadata)
            .await?;

        info!(
            deployment_id = %self.id,
            status = %record.status,
            "deployment status changed"
        );

        Ok(Some(record))
    }
}

/// Failure text stored on the record, without the error-kind prefix.
fn failure_reason(err: &HubError) -> String {
    match err {
        HubError::Internal(msg) => msg.clone(),
        other => other.to_string(),
    }
}

//! Core deployment lifecycle logic.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::LogsConfig;
use crate::error::{HubError, HubResult};
use crate::events::{EventLog, COMPONENT_MONITOR, COMPONENT_SYSTEM};
use crate::locks::DeploymentLocks;
use crate::provisioner::Provisioner;
use crate::state::Transition;
use crate::store::{DeploymentFilter, DeploymentStore, ModelCatalog};
use crate::types::{
    DeploymentDraft, DeploymentEvent, DeploymentId, DeploymentMetrics, DeploymentPatch,
    DeploymentRecord, DeploymentSpec, DeploymentStatus, EventLevel, ModelVersion, UserId,
};
use crate::validate;

use super::task::ProvisioningTask;
use super::{DeploymentAction, InFlight, LifecycleContext};

/// Deployments returned by a list call when no limit is given.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Largest accepted list page.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Events included in the detail view.
const DETAIL_EVENT_COUNT: u32 = 10;

/// A deployment with its metrics and most recent events.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentDetail {
    /// The deployment record.
    #[serde(flatten)]
    pub deployment: DeploymentRecord,
    /// Metrics snapshot.
    pub metrics: DeploymentMetrics,
    /// Most recent events, newest first.
    pub recent_logs: Vec<DeploymentEvent>,
}

/// Orchestrates deployment lifecycle operations.
///
/// Every mutation of a deployment happens under its per-id lock. Operations
/// that (re)start provisioning return as soon as the new state is persisted
/// and the attempt is scheduled; the attempt itself runs on a tracked task.
pub struct DeploymentManager {
    ctx: Arc<LifecycleContext>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    logs: LogsConfig,
}

impl DeploymentManager {
    /// Create a new deployment manager.
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        catalog: Arc<dyn ModelCatalog>,
        provisioner: Arc<dyn Provisioner>,
        logs: LogsConfig,
    ) -> Self {
        let events = EventLog::new(Arc::clone(&store));
        Self {
            ctx: Arc::new(LifecycleContext {
                store,
                catalog,
                provisioner,
                events,
                locks: DeploymentLocks::new(),
                in_flight: DashMap::new(),
            }),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            logs,
        }
    }

    /// Create a deployment and schedule its first provisioning attempt.
    ///
    /// Returns the `Pending` record without waiting for provisioning.
    pub async fn create(&self, owner: UserId, spec: DeploymentSpec) -> HubResult<DeploymentRecord> {
        validate::spec(&spec)?;

        let model = self
            .ctx
            .catalog
            .get_model(spec.model_id)
            .await?
            .filter(|m| m.owner_id == owner)
            .ok_or_else(|| HubError::not_found(format!("model {}", spec.model_id)))?;

        let version = self.resolve_version(&spec).await?;

        let record = self
            .ctx
            .store
            .insert(&DeploymentDraft::new(owner, spec, version.id))
            .await?;

        let guard = self.ctx.locks.acquire(record.id).await;

        let logged = self
            .ctx
            .events
            .append(
                record.id,
                EventLevel::Info,
                COMPONENT_SYSTEM,
                format!("Deployment '{}' created", record.name),
                json!({
                    "model_id": model.id,
                    "model_version_id": version.id,
                    "version": version.version,
                    "kind": record.kind,
                }),
            )
            .await;
        if let Err(e) = logged {
            // Never leave a pending record that nothing will provision
            warn!(deployment_id = %record.id, error = %e, "creation not logged, removing deployment");
            if let Err(cleanup) = self.ctx.store.delete(record.id).await {
                error!(deployment_id = %record.id, error = %cleanup, "failed to remove deployment");
            }
            drop(guard);
            self.ctx.locks.forget(record.id);
            return Err(e);
        }

        info!(
            deployment_id = %record.id,
            owner_id = %owner,
            kind = %record.kind,
            model_version_id = %version.id,
            "deployment created"
        );

        self.schedule(record.id, record.generation);

        Ok(record)
    }

    async fn resolve_version(&self, spec: &DeploymentSpec) -> HubResult<ModelVersion> {
        match spec.model_version_id {
            Some(version_id) => self
                .ctx
                .catalog
                .get_version(version_id)
                .await?
                .filter(|v| v.model_id == spec.model_id)
                .ok_or_else(|| HubError::not_found(format!("model version {version_id}"))),
            None => self
                .ctx
                .catalog
                .latest_version(spec.model_id)
                .await?
                .ok_or_else(|| {
                    HubError::not_found(format!("no versions found for model {}", spec.model_id))
                }),
        }
    }

    /// Get a deployment owned by `owner`.
    pub async fn get(&self, owner: UserId, id: DeploymentId) -> HubResult<DeploymentRecord> {
        self.ctx.fetch_owned(id, owner).await
    }

    /// Get a deployment with its metrics and most recent events.
    pub async fn detail(&self, owner: UserId, id: DeploymentId) -> HubResult<DeploymentDetail> {
        let deployment = self.ctx.fetch_owned(id, owner).await?;
        let recent_logs = self.ctx.events.recent(id, DETAIL_EVENT_COUNT).await?;

        Ok(DeploymentDetail {
            metrics: deployment.metrics(),
            deployment,
            recent_logs,
        })
    }

    /// List deployments owned by `owner`, newest first.
    pub async fn list(
        &self,
        owner: UserId,
        status: Option<DeploymentStatus>,
        skip: u32,
        limit: Option<u32>,
    ) -> HubResult<Vec<DeploymentRecord>> {
        let limit = page_limit(limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)?;

        let mut filter = DeploymentFilter::new()
            .with_owner(owner)
            .with_offset(skip)
            .with_limit(limit);
        if let Some(status) = status {
            filter = filter.with_status(status);
        }

        self.ctx.store.list(&filter).await
    }

    /// Apply a partial configuration update.
    ///
    /// Status, endpoint and provisioning are left untouched.
    pub async fn update(
        &self,
        owner: UserId,
        id: DeploymentId,
        patch: DeploymentPatch,
    ) -> HubResult<DeploymentRecord> {
        let (_guard, mut record) = self.ctx.lock_owned(id, owner).await?;

        let changed = patch.apply(&mut record);
        validate::record(&record)?;
        record.updated_at = Utc::now();

        self.ctx.store.update(&record).await?;
        self.ctx
            .events
            .append(
                id,
                EventLevel::Info,
                COMPONENT_SYSTEM,
                "Deployment configuration updated",
                json!({ "fields": changed }),
            )
            .await?;

        info!(deployment_id = %id, fields = ?changed, "deployment updated");

        Ok(record)
    }

    /// Delete a deployment and its event log, stopping it first if running.
    pub async fn delete(&self, owner: UserId, id: DeploymentId) -> HubResult<()> {
        let (guard, mut record) = self.ctx.lock_owned(id, owner).await?;

        if record.status == DeploymentStatus::Running {
            self.stop_locked(&mut record).await?;
        }
        self.ctx.cancel_in_flight(id);

        self.ctx.store.delete(id).await?;
        drop(guard);
        self.ctx.locks.forget(id);

        info!(deployment_id = %id, "deployment deleted");

        Ok(())
    }

    /// Start (or retry) a deployment that is not running.
    ///
    /// Returns the `Deploying` record without waiting for provisioning.
    pub async fn start(&self, owner: UserId, id: DeploymentId) -> HubResult<DeploymentRecord> {
        let (_guard, mut record) = self.ctx.lock_owned(id, owner).await?;

        if record.status == DeploymentStatus::Running {
            return Err(HubError::conflict("deployment is already running"));
        }

        let previous = record.status;
        record.apply(Transition::Start)?;
        self.ctx.store.update(&record).await?;
        self.ctx
            .events
            .append(
                id,
                EventLevel::Info,
                COMPONENT_SYSTEM,
                "Deployment start requested",
                json!({ "previous_status": previous, "generation": record.generation }),
            )
            .await?;

        info!(deployment_id = %id, generation = record.generation, "deployment starting");

        self.schedule(id, record.generation);

        Ok(record)
    }

    /// Stop a deployment. Allowed from every status; stopping a stopped
    /// deployment leaves the record as is and only logs the request again.
    pub async fn stop(&self, owner: UserId, id: DeploymentId) -> HubResult<DeploymentRecord> {
        let (_guard, mut record) = self.ctx.lock_owned(id, owner).await?;

        self.stop_locked(&mut record).await?;

        Ok(record)
    }

    /// Stop then start. Not atomic: a failed start leaves the deployment stopped.
    pub async fn restart(&self, owner: UserId, id: DeploymentId) -> HubResult<DeploymentRecord> {
        self.stop(owner, id).await?;
        self.start(owner, id).await
    }

    /// Dispatch a lifecycle action.
    pub async fn perform(
        &self,
        owner: UserId,
        id: DeploymentId,
        action: DeploymentAction,
    ) -> HubResult<DeploymentRecord> {
        match action {
            DeploymentAction::Start => self.start(owner, id).await,
            DeploymentAction::Stop => self.stop(owner, id).await,
            DeploymentAction::Restart => self.restart(owner, id).await,
        }
    }

    /// Metrics snapshot for a deployment.
    pub async fn metrics(&self, owner: UserId, id: DeploymentId) -> HubResult<DeploymentMetrics> {
        Ok(self.ctx.fetch_owned(id, owner).await?.metrics())
    }

    /// Most recent events for a deployment, newest first.
    pub async fn logs(
        &self,
        owner: UserId,
        id: DeploymentId,
        limit: Option<u32>,
    ) -> HubResult<Vec<DeploymentEvent>> {
        let limit = page_limit(limit, self.logs.default_limit, self.logs.max_limit)?;
        self.ctx.fetch_owned(id, owner).await?;
        self.ctx.events.recent(id, limit).await
    }

    /// Mock prediction against a running deployment.
    ///
    /// Records usage but never contacts a model server: the response is a
    /// fixed body echoing the input.
    pub async fn predict(
        &self,
        owner: UserId,
        id: DeploymentId,
        input: Value,
    ) -> HubResult<Value> {
        let (_guard, mut record) = self.ctx.lock_owned(id, owner).await?;

        if record.status != DeploymentStatus::Running {
            return Err(HubError::invalid_state(format!(
                "deployment is not running (status: {})",
                record.status
            )));
        }

        let model_name = self
            .ctx
            .catalog
            .get_model(record.model_id)
            .await?
            .map_or_else(|| "unknown".to_owned(), |m| m.name);

        record.usage.request_count += 1;
        record.usage.last_request_at = Some(Utc::now());
        self.ctx.store.update(&record).await?;

        debug!(
            deployment_id = %id,
            request_count = record.usage.request_count,
            "prediction served"
        );

        Ok(json!({
            "deployment_id": id,
            "model_name": model_name,
            "prediction": "This is a mock prediction response",
            "input": input,
            "status": "success",
        }))
    }

    /// Stamp `last_health_check` on every running deployment.
    ///
    /// Returns the number of deployments checked.
    pub async fn record_health_checks(&self) -> HubResult<usize> {
        let running = self
            .ctx
            .store
            .list(&DeploymentFilter::new().with_status(DeploymentStatus::Running))
            .await?;

        let mut checked = 0;
        for candidate in running {
            let guard = self.ctx.locks.acquire(candidate.id).await;
            let Some(mut record) = self.ctx.store.get(candidate.id).await? else {
                drop(guard);
                self.ctx.locks.forget_idle(candidate.id);
                continue;
            };
            if record.status != DeploymentStatus::Running {
                continue;
            }

            record.usage.last_health_check = Some(Utc::now());
            self.ctx.store.update(&record).await?;
            checked += 1;

            debug!(
                deployment_id = %record.id,
                component = COMPONENT_MONITOR,
                path = %record.health_check_path,
                "health check recorded"
            );
        }

        Ok(checked)
    }

    /// Number of provisioning attempts currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.ctx.in_flight.len()
    }

    /// Cancel all in-flight provisioning and wait for the tasks to exit.
    pub async fn shutdown(&self) {
        info!(in_flight = self.in_flight(), "stopping provisioning tasks");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn stop_locked(&self, record: &mut DeploymentRecord) -> HubResult<()> {
        let previous = record.status;

        // Already stopped: no attempt can be in flight, only re-log the request
        if previous != DeploymentStatus::Stopped {
            record.apply(Transition::Stop)?;
            self.ctx.cancel_in_flight(record.id);
            self.ctx.store.update(record).await?;
        }

        self.ctx
            .events
            .append(
                record.id,
                EventLevel::Info,
                COMPONENT_SYSTEM,
                "Deployment stopped",
                json!({ "previous_status": previous }),
            )
            .await?;

        info!(deployment_id = %record.id, previous = %previous, "deployment stopped");

        Ok(())
    }

    /// Schedule a provisioning attempt for `generation`, superseding any
    /// older attempt. Must be called while holding the deployment's lock.
    fn schedule(&self, id: DeploymentId, generation: u64) {
        if self.shutdown.is_cancelled() {
            warn!(deployment_id = %id, "shutting down, provisioning not scheduled");
            return;
        }

        let cancel = self.shutdown.child_token();
        match self.ctx.in_flight.entry(id) {
            Entry::Occupied(mut entry) => {
                if entry.get().generation >= generation {
                    debug!(deployment_id = %id, generation, "attempt already in flight");
                    return;
                }
                debug!(
                    deployment_id = %id,
                    superseded = entry.get().generation,
                    generation,
                    "superseding provisioning attempt"
                );
                entry.get().cancel.cancel();
                entry.insert(InFlight {
                    generation,
                    cancel: cancel.clone(),
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(InFlight {
                    generation,
                    cancel: cancel.clone(),
                });
            }
        }

        let task = ProvisioningTask::new(Arc::clone(&self.ctx), id, generation, cancel);
        self.tracker.spawn(task.run());
    }
}

impl std::fmt::Debug for DeploymentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentManager")
            .field("in_flight", &self.ctx.in_flight.len())
            .field("tasks", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

fn page_limit(requested: Option<u32>, default: u32, max: u32) -> HubResult<u32> {
    match requested {
        None => Ok(default),
        Some(limit) if (1..=max).contains(&limit) => Ok(limit),
        Some(_) => Err(HubError::validation(format!(
            "limit must be between 1 and {max}"
        ))),
    }
}

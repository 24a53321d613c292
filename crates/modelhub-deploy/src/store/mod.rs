//! Deployment storage backends.
//!
//! This module provides traits and implementations for persisting deployment
//! records, their event logs and the model catalogue they reference. The
//! primary implementation uses PostgreSQL, but an in-memory implementation is
//! provided for testing and local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::HubResult;
use crate::types::{
    DeploymentDraft, DeploymentEvent, DeploymentId, DeploymentRecord, DeploymentStatus, Model,
    ModelId, ModelVersion, ModelVersionId, NewEvent, UserId,
};

/// Filter criteria for listing deployments.
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    /// Filter by owner.
    pub owner_id: Option<UserId>,
    /// Filter by status.
    pub status: Option<DeploymentStatus>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
}

impl DeploymentFilter {
    /// Create a new empty filter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            owner_id: None,
            status: None,
            limit: None,
            offset: None,
        }
    }

    /// Filter by owner.
    #[must_use]
    pub const fn with_owner(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Filter by status.
    #[must_use]
    pub const fn with_status(mut self, status: DeploymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set maximum results.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set pagination offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    fn matches(&self, record: &DeploymentRecord) -> bool {
        self.owner_id.map_or(true, |owner| record.owner_id == owner)
            && self.status.map_or(true, |status| record.status == status)
    }
}

/// Backend for storing deployment records and their event logs.
///
/// Writers to a single deployment are serialised by the lifecycle manager,
/// so implementations only need per-call atomicity.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Persist a new deployment and return it with its assigned ID.
    ///
    /// Returns `Conflict` if the owner already has a deployment with that name.
    async fn insert(&self, draft: &DeploymentDraft) -> HubResult<DeploymentRecord>;

    /// Get a deployment by ID.
    ///
    /// Returns `None` if the deployment does not exist.
    async fn get(&self, id: DeploymentId) -> HubResult<Option<DeploymentRecord>>;

    /// Overwrite a deployment record.
    ///
    /// Returns `NotFound` if the record was deleted and `Conflict` if a rename
    /// collides with another deployment of the same owner.
    async fn update(&self, record: &DeploymentRecord) -> HubResult<()>;

    /// Delete a deployment together with its events.
    async fn delete(&self, id: DeploymentId) -> HubResult<()>;

    /// List deployments matching the filter criteria.
    ///
    /// Results are ordered by `created_at` descending (newest first).
    async fn list(&self, filter: &DeploymentFilter) -> HubResult<Vec<DeploymentRecord>>;

    /// Append an event to a deployment's log.
    ///
    /// Returns `NotFound` if the deployment does not exist.
    async fn append_event(&self, event: &NewEvent) -> HubResult<DeploymentEvent>;

    /// Most recent events for a deployment, newest first.
    async fn list_events(&self, id: DeploymentId, limit: u32)
        -> HubResult<Vec<DeploymentEvent>>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> HubResult<()>;
}

/// Read access to the models and versions that deployments reference.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Get a model by ID.
    async fn get_model(&self, id: ModelId) -> HubResult<Option<Model>>;

    /// Get a model version by ID.
    async fn get_version(&self, id: ModelVersionId) -> HubResult<Option<ModelVersion>>;

    /// The most recently created version of a model.
    async fn latest_version(&self, model_id: ModelId) -> HubResult<Option<ModelVersion>>;
}

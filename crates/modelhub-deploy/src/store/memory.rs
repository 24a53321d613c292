//! In-memory deployment store for testing.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{HubError, HubResult};
use crate::types::{
    DeploymentDraft, DeploymentEvent, DeploymentId, DeploymentRecord, EventId, Model, ModelId,
    ModelVersion, ModelVersionId, NewEvent, UserId,
};

use super::{DeploymentFilter, DeploymentStore, ModelCatalog};

/// In-memory deployment store and model catalogue.
///
/// This implementation is not suitable for production use as data is lost
/// when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    deployments: BTreeMap<DeploymentId, DeploymentRecord>,
    events: BTreeMap<DeploymentId, Vec<DeploymentEvent>>,
    models: BTreeMap<ModelId, Model>,
    versions: BTreeMap<ModelVersionId, ModelVersion>,
    last_deployment_id: i64,
    last_event_id: i64,
    last_model_id: i64,
    last_version_id: i64,
}

impl Inner {
    fn name_taken(&self, owner_id: UserId, name: &str, except: Option<DeploymentId>) -> bool {
        self.deployments
            .values()
            .any(|d| d.owner_id == owner_id && d.name == name && Some(d.id) != except)
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> HubResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| HubError::internal("lock poisoned"))
    }

    fn write(&self) -> HubResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| HubError::internal("lock poisoned"))
    }

    /// Register a model owned by `owner_id`.
    pub fn add_model(
        &self,
        owner_id: UserId,
        name: impl Into<String>,
        framework: impl Into<String>,
    ) -> HubResult<Model> {
        let mut inner = self.write()?;
        inner.last_model_id += 1;
        let model = Model {
            id: ModelId::new(inner.last_model_id),
            owner_id,
            name: name.into(),
            framework: framework.into(),
        };
        inner.models.insert(model.id, model.clone());
        Ok(model)
    }

    /// Register a new version of an existing model.
    pub fn add_version(
        &self,
        model_id: ModelId,
        version: impl Into<String>,
        artifact_path: impl Into<String>,
    ) -> HubResult<ModelVersion> {
        let mut inner = self.write()?;
        if !inner.models.contains_key(&model_id) {
            return Err(HubError::not_found(format!("model {model_id}")));
        }
        inner.last_version_id += 1;
        let version = ModelVersion {
            id: ModelVersionId::new(inner.last_version_id),
            model_id,
            version: version.into(),
            artifact_path: artifact_path.into(),
            created_at: Utc::now(),
        };
        inner.versions.insert(version.id, version.clone());
        Ok(version)
    }

    /// Remove a model version, leaving deployments that reference it dangling.
    pub fn remove_version(&self, id: ModelVersionId) -> HubResult<()> {
        self.write()?.versions.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert(&self, draft: &DeploymentDraft) -> HubResult<DeploymentRecord> {
        let mut inner = self.write()?;

        if inner.name_taken(draft.owner_id, &draft.spec.name, None) {
            return Err(HubError::conflict(format!(
                "deployment name '{}' already exists",
                draft.spec.name
            )));
        }

        inner.last_deployment_id += 1;
        let record = draft
            .clone()
            .into_record(DeploymentId::new(inner.last_deployment_id));
        inner.deployments.insert(record.id, record.clone());

        Ok(record)
    }

    async fn get(&self, id: DeploymentId) -> HubResult<Option<DeploymentRecord>> {
        Ok(self.read()?.deployments.get(&id).cloned())
    }

    async fn update(&self, record: &DeploymentRecord) -> HubResult<()> {
        let mut inner = self.write()?;

        if !inner.deployments.contains_key(&record.id) {
            return Err(HubError::not_found(format!("deployment {}", record.id)));
        }
        if inner.name_taken(record.owner_id, &record.name, Some(record.id)) {
            return Err(HubError::conflict(format!(
                "deployment name '{}' already exists",
                record.name
            )));
        }

        inner.deployments.insert(record.id, record.clone());
        Ok(())
    }

    async fn delete(&self, id: DeploymentId) -> HubResult<()> {
        let mut inner = self.write()?;

        if inner.deployments.remove(&id).is_none() {
            return Err(HubError::not_found(format!("deployment {id}")));
        }
        inner.events.remove(&id);

        Ok(())
    }

    async fn list(&self, filter: &DeploymentFilter) -> HubResult<Vec<DeploymentRecord>> {
        let inner = self.read()?;

        let mut results: Vec<_> = inner
            .deployments
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        #[allow(clippy::as_conversions)]
        let offset = filter.offset.unwrap_or(0) as usize;
        let results = results.into_iter().skip(offset);

        match filter.limit {
            #[allow(clippy::as_conversions)]
            Some(limit) => Ok(results.take(limit as usize).collect()),
            None => Ok(results.collect()),
        }
    }

    async fn append_event(&self, event: &NewEvent) -> HubResult<DeploymentEvent> {
        let mut inner = self.write()?;

        if !inner.deployments.contains_key(&event.deployment_id) {
            return Err(HubError::not_found(format!(
                "deployment {}",
                event.deployment_id
            )));
        }

        inner.last_event_id += 1;
        let stored = DeploymentEvent {
            id: EventId::new(inner.last_event_id),
            deployment_id: event.deployment_id,
            level: event.level,
            message: event.message.clone(),
            component: event.component.clone(),
            metadata: event.metadata.clone(),
            created_at: Utc::now(),
        };
        inner
            .events
            .entry(event.deployment_id)
            .or_default()
            .push(stored.clone());

        Ok(stored)
    }

    async fn list_events(
        &self,
        id: DeploymentId,
        limit: u32,
    ) -> HubResult<Vec<DeploymentEvent>> {
        let inner = self.read()?;

        let Some(events) = inner.events.get(&id) else {
            return Ok(Vec::new());
        };

        let mut events = events.clone();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        #[allow(clippy::as_conversions)]
        events.truncate(limit as usize);

        Ok(events)
    }

    async fn ping(&self) -> HubResult<()> {
        self.read().map(|_| ())
    }
}

#[async_trait]
impl ModelCatalog for MemoryStore {
    async fn get_model(&self, id: ModelId) -> HubResult<Option<Model>> {
        Ok(self.read()?.models.get(&id).cloned())
    }

    async fn get_version(&self, id: ModelVersionId) -> HubResult<Option<ModelVersion>> {
        Ok(self.read()?.versions.get(&id).cloned())
    }

    async fn latest_version(&self, model_id: ModelId) -> HubResult<Option<ModelVersion>> {
        Ok(self
            .read()?
            .versions
            .values()
            .filter(|v| v.model_id == model_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }
}

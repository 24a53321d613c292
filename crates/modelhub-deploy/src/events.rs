//! Deployment event log.
//!
//! Events are persisted through the [`DeploymentStore`] and mirrored to
//! `tracing` at the matching level, so operators see the same lifecycle
//! history in process logs that owners see through the API.

use std::sync::Arc;

use serde_json::Value;

use crate::error::HubResult;
use crate::store::DeploymentStore;
use crate::types::{DeploymentEvent, DeploymentId, EventLevel, NewEvent};

/// Component name for API-initiated lifecycle events.
pub const COMPONENT_SYSTEM: &str = "system";
/// Component name for provisioning events.
pub const COMPONENT_DEPLOYER: &str = "deployer";
/// Component name for health monitor events.
pub const COMPONENT_MONITOR: &str = "monitor";

/// Appends and reads deployment events.
#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn DeploymentStore>,
}

impl EventLog {
    /// Create an event log backed by `store`.
    pub fn new(store: Arc<dyn DeploymentStore>) -> Self {
        Self { store }
    }

    /// Append an event and mirror it to tracing.
    pub async fn append(
        &self,
        deployment_id: DeploymentId,
        level: EventLevel,
        component: &str,
        message: impl Into<String>,
        metadata: Value,
    ) -> HubResult<DeploymentEvent> {
        let event = NewEvent {
            deployment_id,
            level,
            message: message.into(),
            component: component.to_owned(),
            metadata,
        };

        match level {
            EventLevel::Debug => {
                tracing::debug!(deployment_id = %deployment_id, component, "{}", event.message);
            }
            EventLevel::Info => {
                tracing::info!(deployment_id = %deployment_id, component, "{}", event.message);
            }
            EventLevel::Warning => {
                tracing::warn!(deployment_id = %deployment_id, component, "{}", event.message);
            }
            EventLevel::Error => {
                tracing::error!(deployment_id = %deployment_id, component, "{}", event.message);
            }
        }

        self.store.append_event(&event).await
    }

    /// Most recent events for a deployment, newest first.
    pub async fn recent(
        &self,
        deployment_id: DeploymentId,
        limit: u32,
    ) -> HubResult<Vec<DeploymentEvent>> {
        self.store.list_events(deployment_id, limit).await
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").finish_non_exhaustive()
    }
}

//! Model Hub deployment lifecycle manager.
//!
//! This crate turns a registered model version into a running inference
//! endpoint and keeps track of it afterwards.
//!
//! # Architecture
//!
//! - **State management**: every status change is checked against the
//!   transition table in [`state`] before it is persisted
//! - **Provisioning**: a background task per attempt walks a deployment
//!   through `building` and `deploying` to `running` or `failed`, fenced by a
//!   generation counter so stale attempts cannot overwrite newer ones
//! - **Event log**: an append-only per-deployment record of what happened,
//!   mirrored to `tracing`
//! - **API surface**: owner-scoped HTTP endpoints for CRUD, lifecycle actions,
//!   metrics, logs and a prediction stub
//!
//! # State Machine
//!
//! ```text
//! Pending ──▶ Building ──▶ Deploying ──▶ Running ──▶ Stopped
//!                │             │                       │
//!                ▼             ▼                       │
//!              Failed ◀────────┘                       │
//!                │                                     │
//!                └──────── start ──▶ Deploying ◀───────┘
//! ```
//!
//! Invalid transitions are rejected with
//! [`HubError::InvalidStateTransition`] and leave the record unchanged.

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod api;
pub mod auth;
pub mod config;
pub mod deployment;
pub mod error;
pub mod events;
pub mod health;
pub mod locks;
pub mod provisioner;
pub mod service;
pub mod state;
pub mod store;
pub mod types;
pub mod validate;

// Re-export commonly used types at the crate root
pub use auth::{Authenticator, Caller};
pub use config::HubConfig;
pub use deployment::{DeploymentAction, DeploymentDetail, DeploymentManager};
pub use error::{HubError, HubResult};
pub use events::EventLog;
pub use health::HealthMonitor;
pub use provisioner::{create_provisioner, ProvisionPlan, Provisioner, SimulatedProvisioner};
pub use service::HubService;
pub use state::Transition;
pub use store::{DeploymentFilter, DeploymentStore, MemoryStore, ModelCatalog, PostgresStore};
pub use types::{
    DeploymentEvent, DeploymentId, DeploymentKind, DeploymentMetrics, DeploymentPatch,
    DeploymentRecord, DeploymentSpec, DeploymentStatus, EventLevel, Model, ModelId,
    ModelVersion, ModelVersionId, UserId,
};

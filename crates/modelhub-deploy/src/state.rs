//! Deployment state machine.
//!
//! Every status change goes through [`DeploymentRecord::apply`], which checks
//! the transition table and keeps the record invariants:
//!
//! - `endpoint_url` is set only while `Running`
//! - `error_message` is set only while `Failed`
//! - `generation` is bumped by every user-initiated start or stop, fencing
//!   off any provisioning attempt that captured an older value
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
//! `Stop` is accepted from every status. `Updating` is reserved and no
//! transition produces it yet.

use chrono::Utc;

use crate::error::{HubError, HubResult};
use crate::types::{DeploymentRecord, DeploymentStatus};

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Provisioning picked the deployment up.
    StartBuilding,
    /// Build finished, endpoint being activated.
    StartDeploying,
    /// Endpoint is live.
    Run {
        /// Public endpoint URL.
        endpoint_url: String,
    },
    /// Provisioning failed.
    Fail {
        /// Failure reason.
        error: String,
    },
    /// Owner stopped the deployment. Bumps the generation.
    Stop,
    /// Owner (re)started the deployment. Bumps the generation.
    Start,
}

impl Transition {
    /// Status this transition leads to.
    #[must_use]
    pub const fn target(&self) -> DeploymentStatus {
        match self {
            Self::StartBuilding => DeploymentStatus::Building,
            Self::StartDeploying | Self::Start => DeploymentStatus::Deploying,
            Self::Run { .. } => DeploymentStatus::Running,
            Self::Fail { .. } => DeploymentStatus::Failed,
            Self::Stop => DeploymentStatus::Stopped,
        }
    }

    /// Whether this transition may be applied to a deployment in `from`.
    #[must_use]
    pub const fn allowed_from(&self, from: DeploymentStatus) -> bool {
        use DeploymentStatus as S;

        match self {
            Self::StartBuilding => matches!(from, S::Pending | S::Deploying),
            Self::StartDeploying => matches!(from, S::Building),
            Self::Run { .. } => matches!(from, S::Deploying | S::Updating),
            Self::Fail { .. } => matches!(from, S::Building | S::Deploying | S::Updating),
            Self::Stop => true,
            Self::Start => !matches!(from, S::Running),
        }
    }

    const fn bumps_generation(&self) -> bool {
        matches!(self, Self::Start | Self::Stop)
    }
}

impl DeploymentRecord {
    /// Apply a transition, enforcing the state table and record invariants.
    pub fn apply(&mut self, transition: Transition) -> HubResult<()> {
        let from = self.status;
        if !transition.allowed_from(from) {
            return Err(HubError::InvalidStateTransition {
                from: from.as_str(),
                to: transition.target().as_str(),
            });
        }

        let now = Utc::now();
        if transition.bumps_generation() {
            self.generation += 1;
        }
        self.status = transition.target();
        self.updated_at = now;

        match transition {
            Transition::Run { endpoint_url } => {
                self.endpoint_url = Some(endpoint_url);
                self.error_message = None;
                self.deployed_at = Some(now);
            }
            Transition::Fail { error } => {
                self.endpoint_url = None;
                self.error_message = Some(error);
            }
            _ => {
                self.endpoint_url = None;
                self.error_message = None;
            }
        }

        Ok(())
    }

    /// Whether the record currently satisfies the status invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let endpoint_ok =
            self.endpoint_url.is_none() || self.status == DeploymentStatus::Running;
        let error_ok = self.error_message.is_none() || self.status == DeploymentStatus::Failed;
        endpoint_ok && error_ok
    }
}

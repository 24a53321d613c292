//! Error types for modelhub-deploy.

/// Result type alias using [`HubError`].
pub type HubResult<T> = Result<T, HubError>;

/// Errors that can occur in the deployment lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Referenced deployment, model or version is absent or not owned by the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate name or a request that conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Action not applicable to the deployment's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Transition rejected by the deployment state machine.
    #[error("invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: &'static str,
        /// Attempted target state.
        to: &'static str,
    },

    /// Request payload violates a field constraint.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid caller identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error, including provisioning failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an invalid-state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

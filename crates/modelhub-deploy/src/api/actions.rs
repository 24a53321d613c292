//! Lifecycle action and prediction endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::auth::Caller;
use crate::deployment::DeploymentAction;
use crate::error::HubError;
use crate::types::{DeploymentId, DeploymentRecord, DeploymentStatus};

use super::{ApiError, AppState};

/// Request body for the actions endpoint.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    /// Action to perform.
    pub action: DeploymentAction,
}

/// Outcome of a lifecycle action.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Whether the action was applied.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Target deployment.
    pub deployment_id: DeploymentId,
    /// Status after the action, when it succeeded.
    pub new_status: Option<DeploymentStatus>,
}

/// Start a deployment.
pub async fn start_deployment(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<DeploymentRecord>), ApiError> {
    let record = state.manager.start(owner, DeploymentId::new(id)).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// Stop a deployment.
pub async fn stop_deployment(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
) -> Result<Json<DeploymentRecord>, ApiError> {
    let record = state.manager.stop(owner, DeploymentId::new(id)).await?;
    Ok(Json(record))
}

/// Restart a deployment.
pub async fn restart_deployment(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<DeploymentRecord>), ApiError> {
    let record = state.manager.restart(owner, DeploymentId::new(id)).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// Dispatch a lifecycle action.
///
/// Unknown deployments are a 404; any other failure is reported in the body
/// with `success: false`.
pub async fn deployment_action(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let deployment_id = DeploymentId::new(id);
    info!(deployment_id = %deployment_id, action = %request.action, "deployment action");

    let response = match state
        .manager
        .perform(owner, deployment_id, request.action)
        .await
    {
        Ok(record) => ActionResponse {
            success: true,
            message: success_message(request.action).to_owned(),
            deployment_id,
            new_status: Some(record.status),
        },
        Err(e @ HubError::NotFound(_)) => return Err(e.into()),
        Err(e) => ActionResponse {
            success: false,
            message: e.to_string(),
            deployment_id,
            new_status: None,
        },
    };

    Ok(Json(response))
}

const fn success_message(action: DeploymentAction) -> &'static str {
    match action {
        DeploymentAction::Start => "Deployment start initiated",
        DeploymentAction::Stop => "Deployment stopped",
        DeploymentAction::Restart => "Deployment restart initiated",
    }
}

/// Mock prediction against a running deployment.
///
/// Does not forward to a model server; see [`DeploymentManager::predict`].
///
/// [`DeploymentManager::predict`]: crate::deployment::DeploymentManager::predict
pub async fn predict(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
    Json(input): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let response = state
        .manager
        .predict(owner, DeploymentId::new(id), input)
        .await?;
    Ok(Json(response))
}

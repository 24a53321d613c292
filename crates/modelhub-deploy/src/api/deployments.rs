//! Deployment management endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Caller;
use crate::deployment::DeploymentDetail;
use crate::error::HubError;
use crate::types::{
    DeploymentEvent, DeploymentId, DeploymentMetrics, DeploymentPatch, DeploymentRecord,
    DeploymentSpec, DeploymentStatus,
};

use super::{ApiError, AppState};

/// Query parameters for listing deployments.
#[derive(Debug, Default, Deserialize)]
pub struct ListDeploymentsQuery {
    /// Filter by status.
    pub status: Option<String>,
    /// Number of results to skip.
    pub skip: Option<u32>,
    /// Maximum number of results.
    pub limit: Option<u32>,
}

/// Query parameters for reading deployment logs.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    /// Maximum number of events.
    pub limit: Option<u32>,
}

/// Response for deleting a deployment.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Confirmation message.
    pub message: &'static str,
}

/// Create a new deployment.
pub async fn create_deployment(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(spec): Json<DeploymentSpec>,
) -> Result<(StatusCode, Json<DeploymentRecord>), ApiError> {
    info!(
        owner_id = %owner,
        name = %spec.name,
        kind = %spec.kind,
        model_id = %spec.model_id,
        "creating deployment via API"
    );

    let record = state.manager.create(owner, spec).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// List the caller's deployments.
pub async fn list_deployments(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Query(query): Query<ListDeploymentsQuery>,
) -> Result<Json<Vec<DeploymentRecord>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<DeploymentStatus>)
        .transpose()
        .map_err(HubError::Validation)?;

    let records = state
        .manager
        .list(owner, status, query.skip.unwrap_or(0), query.limit)
        .await?;
    Ok(Json(records))
}

/// Get a deployment with its metrics and recent events.
pub async fn get_deployment(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
) -> Result<Json<DeploymentDetail>, ApiError> {
    let detail = state.manager.detail(owner, DeploymentId::new(id)).await?;
    Ok(Json(detail))
}

/// Update a deployment's configuration.
pub async fn update_deployment(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
    Json(patch): Json<DeploymentPatch>,
) -> Result<Json<DeploymentRecord>, ApiError> {
    let record = state
        .manager
        .update(owner, DeploymentId::new(id), patch)
        .await?;
    Ok(Json(record))
}

/// Delete a deployment and its event log.
pub async fn delete_deployment(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.manager.delete(owner, DeploymentId::new(id)).await?;
    Ok(Json(DeleteResponse {
        message: "Deployment deleted successfully",
    }))
}

/// Get a deployment's metrics snapshot.
pub async fn get_metrics(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
) -> Result<Json<DeploymentMetrics>, ApiError> {
    let metrics = state.manager.metrics(owner, DeploymentId::new(id)).await?;
    Ok(Json(metrics))
}

/// Get a deployment's most recent events.
pub async fn get_logs(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<DeploymentEvent>>, ApiError> {
    let events = state
        .manager
        .logs(owner, DeploymentId::new(id), query.limit)
        .await?;
    Ok(Json(events))
}

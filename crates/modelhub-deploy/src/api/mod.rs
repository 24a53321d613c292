//! HTTP API for the deployment service.
//!
//! Provides endpoints for:
//! - Deployment management (create, query, list, update, delete)
//! - Lifecycle actions (start, stop, restart) and the prediction stub
//! - Health and readiness checks
//! - Prometheus metrics

mod actions;
mod deployments;

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::Authenticator;
use crate::deployment::DeploymentManager;
use crate::error::HubError;
use crate::store::{DeploymentFilter, DeploymentStore};
use crate::types::DeploymentStatus;

pub use actions::{ActionRequest, ActionResponse};
pub use deployments::{ListDeploymentsQuery, LogsQuery};

/// Shared application state for the deployment service.
#[derive(Clone)]
pub struct AppState {
    /// Deployment manager for lifecycle operations.
    pub manager: Arc<DeploymentManager>,
    /// Deployment store for operational queries.
    pub store: Arc<dyn DeploymentStore>,
    /// Bearer token validation.
    pub auth: Authenticator,
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Creates the API router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Deployment management
        .route(
            "/deployments",
            post(deployments::create_deployment).get(deployments::list_deployments),
        )
        .route(
            "/deployments/{id}",
            get(deployments::get_deployment)
                .put(deployments::update_deployment)
                .delete(deployments::delete_deployment),
        )
        .route("/deployments/{id}/metrics", get(deployments::get_metrics))
        .route("/deployments/{id}/logs", get(deployments::get_logs))
        // Lifecycle actions
        .route("/deployments/{id}/start", post(actions::start_deployment))
        .route("/deployments/{id}/stop", post(actions::stop_deployment))
        .route("/deployments/{id}/restart", post(actions::restart_deployment))
        .route("/deployments/{id}/actions", post(actions::deployment_action))
        .route("/deployments/{id}/predict", post(actions::predict))
        // Metrics
        .route("/metrics", get(metrics))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error returned by handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub HubError);

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = error_to_status(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

const fn error_to_status(error: &HubError) -> StatusCode {
    match error {
        HubError::NotFound(_) => StatusCode::NOT_FOUND,
        HubError::Conflict(_) | HubError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        HubError::InvalidState(_) => StatusCode::BAD_REQUEST,
        HubError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        HubError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                in_flight: state.manager.in_flight(),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "store not reachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    in_flight: 0,
                }),
            )
        }
    }
}

/// Metrics endpoint.
async fn metrics(State(state): State<AppState>) -> String {
    let mut output = String::new();

    output.push_str("# HELP modelhub_deployments_total Number of deployments by status\n");
    output.push_str("# TYPE modelhub_deployments_total gauge\n");

    for status in DeploymentStatus::ALL {
        let filter = DeploymentFilter::new().with_status(status);
        let count = state
            .store
            .list(&filter)
            .await
            .map(|d| d.len())
            .unwrap_or(0);
        let _ = writeln!(
            output,
            "modelhub_deployments_total{{status=\"{status}\"}} {count}"
        );
    }

    output.push_str("# HELP modelhub_provisioning_in_flight Provisioning attempts in flight\n");
    output.push_str("# TYPE modelhub_provisioning_in_flight gauge\n");
    let _ = writeln!(
        output,
        "modelhub_provisioning_in_flight {}",
        state.manager.in_flight()
    );

    output
}

/// Health response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness response.
#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    in_flight: usize,
}

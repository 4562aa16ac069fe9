//! REST service for the controller.
//!
//! Handlers are thin: every request round-trips through the control
//! loop's channel, so all state stays with the owner task.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use wave_core::api::ApiResponse;
use wavegrid_linkdb::client::{ClientError, LinkDbClient};

use crate::control::{ConnectionRequest, ControlHandle};
use crate::error::ControllerError;
use crate::registry::AgentInfo;

/// Shared state for the controller handlers.
#[derive(Clone)]
pub struct ControllerState {
    pub handle: ControlHandle,
    pub linkdb: LinkDbClient,
}

fn error_status(err: &ControllerError) -> StatusCode {
    match err {
        ControllerError::Validation(_) => StatusCode::BAD_REQUEST,
        ControllerError::NotFound(_) => StatusCode::NOT_FOUND,
        ControllerError::Conflict(_) | ControllerError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        ControllerError::PathInfeasible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ControllerError::LinkDb(ClientError::Api { status, .. }) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        ControllerError::LinkDb(_) => StatusCode::BAD_GATEWAY,
        ControllerError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn controller_error(err: ControllerError) -> axum::response::Response {
    (
        error_status(&err),
        Json(ApiResponse::<()>::err(err.to_string())),
    )
        .into_response()
}

/// Build the controller router.
pub fn build_router(state: ControllerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/api/v1/topology/path/{src}/{dst}", get(path_between))
        .route("/api/v1/connections", get(list_connections).post(create_connection))
        .route(
            "/api/v1/connections/{id}",
            get(get_connection).delete(teardown_connection),
        )
        .route("/api/v1/connections/{id}/setup", post(setup_connection))
        .route(
            "/api/v1/connections/{id}/reconfigure",
            post(reconfigure_connection),
        )
        .route("/api/v1/agents", get(list_agents))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(serde_json::json!({"status": "healthy"})))
}

async fn status(State(state): State<ControllerState>) -> impl IntoResponse {
    match state.handle.status().await {
        Ok(status) => Json(ApiResponse::ok(status)).into_response(),
        Err(e) => controller_error(e),
    }
}

async fn path_between(
    State(state): State<ControllerState>,
    Path((src, dst)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.linkdb.paths(&src, &dst).await {
        Ok(paths) => Json(ApiResponse::ok(paths)).into_response(),
        Err(e) => controller_error(ControllerError::LinkDb(e)),
    }
}

async fn create_connection(
    State(state): State<ControllerState>,
    Json(request): Json<ConnectionRequest>,
) -> impl IntoResponse {
    match state.handle.create(request).await {
        Ok(conn) => (StatusCode::CREATED, Json(ApiResponse::ok(conn))).into_response(),
        Err(e) => controller_error(e),
    }
}

async fn list_connections(State(state): State<ControllerState>) -> impl IntoResponse {
    match state.handle.list().await {
        Ok(conns) => Json(ApiResponse::ok(conns)).into_response(),
        Err(e) => controller_error(e),
    }
}

async fn get_connection(
    State(state): State<ControllerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.handle.get(id.clone()).await {
        Ok(Some(conn)) => Json(ApiResponse::ok(conn)).into_response(),
        Ok(None) => controller_error(ControllerError::NotFound(id)),
        Err(e) => controller_error(e),
    }
}

async fn setup_connection(
    State(state): State<ControllerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.handle.setup(id).await {
        Ok(conn) => Json(ApiResponse::ok(conn)).into_response(),
        Err(e) => controller_error(e),
    }
}

/// Optional body for a manual reconfigure.
#[derive(Debug, Default, Deserialize)]
pub struct ReconfigureRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

async fn reconfigure_connection(
    State(state): State<ControllerState>,
    Path(id): Path<String>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    // The body is optional; an empty or absent body means operator intent.
    let reason = serde_json::from_slice::<ReconfigureRequest>(&body)
        .ok()
        .and_then(|b| b.reason)
        .unwrap_or_else(|| "operator_request".to_string());
    match state.handle.reconfigure(id, reason).await {
        Ok(conn) => Json(ApiResponse::ok(conn)).into_response(),
        Err(e) => controller_error(e),
    }
}

async fn teardown_connection(
    State(state): State<ControllerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.handle.teardown(id).await {
        Ok(conn) => Json(ApiResponse::ok(conn)).into_response(),
        Err(e) => controller_error(e),
    }
}

/// Agent entry for `GET /api/v1/agents`.
#[derive(Debug, Serialize)]
pub struct AgentView {
    #[serde(flatten)]
    pub info: AgentInfo,
    pub online: bool,
}

async fn list_agents(State(state): State<ControllerState>) -> impl IntoResponse {
    match state.handle.agents().await {
        Ok(agents) => {
            let views: Vec<AgentView> = agents
                .into_iter()
                .map(|(info, online)| AgentView { info, online })
                .collect();
            Json(ApiResponse::ok(views)).into_response()
        }
        Err(e) => controller_error(e),
    }
}

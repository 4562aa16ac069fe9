//! REST service for the Slice Manager.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use wave_core::api::ApiResponse;

use crate::error::SliceError;
use crate::orchestrator::{SliceOrchestrator, VopActivationRequest};

/// Shared state for the Slice Manager handlers.
#[derive(Clone)]
pub struct SliceState {
    pub orchestrator: Arc<SliceOrchestrator>,
}

fn error_status(err: &SliceError) -> StatusCode {
    match err {
        SliceError::Validation(_) => StatusCode::BAD_REQUEST,
        SliceError::AlreadyActive(_) | SliceError::InterfaceUnavailable(_) => StatusCode::CONFLICT,
        SliceError::NotFound(_) => StatusCode::NOT_FOUND,
        SliceError::Topics(_) | SliceError::Deploy(_) | SliceError::LinkDb(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn slice_error(err: SliceError) -> axum::response::Response {
    (
        error_status(&err),
        Json(ApiResponse::<()>::err(err.to_string())),
    )
        .into_response()
}

/// Build the Slice Manager router.
pub fn build_router(orchestrator: Arc<SliceOrchestrator>) -> Router {
    let state = SliceState { orchestrator };
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/vops", get(list_vops).post(activate_vop))
        .route("/api/v1/vops/{id}", get(get_vop).delete(deactivate_vop))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthView {
    status: &'static str,
    vops: usize,
}

async fn health(State(state): State<SliceState>) -> impl IntoResponse {
    match state.orchestrator.list().await {
        Ok(vops) => Json(ApiResponse::ok(HealthView {
            status: "healthy",
            vops: vops.len(),
        }))
        .into_response(),
        Err(e) => slice_error(e),
    }
}

async fn activate_vop(
    State(state): State<SliceState>,
    Json(request): Json<VopActivationRequest>,
) -> impl IntoResponse {
    match state.orchestrator.activate(&request).await {
        Ok(vop) => (StatusCode::CREATED, Json(ApiResponse::ok(vop))).into_response(),
        Err(e) => slice_error(e),
    }
}

async fn list_vops(State(state): State<SliceState>) -> impl IntoResponse {
    match state.orchestrator.list().await {
        Ok(vops) => Json(ApiResponse::ok(vops)).into_response(),
        Err(e) => slice_error(e),
    }
}

async fn get_vop(State(state): State<SliceState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.get(&id).await {
        Ok(vop) => Json(ApiResponse::ok(vop)).into_response(),
        Err(e) => slice_error(e),
    }
}

async fn deactivate_vop(
    State(state): State<SliceState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.deactivate(&id).await {
        Ok(vop) => Json(ApiResponse::ok(vop)).into_response(),
        Err(e) => slice_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        assert_eq!(
            error_status(&SliceError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&SliceError::AlreadyActive("v".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_status(&SliceError::NotFound("v".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&SliceError::Topics("down".into())),
            StatusCode::BAD_GATEWAY
        );
    }
}

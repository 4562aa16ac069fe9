//! REST service over the Link Database.
//!
//! Each handler reads/writes via [`LinkDb`] and returns the shared
//! `ApiResponse` JSON envelope. Domain errors map onto distinct HTTP
//! statuses so clients can tell `NoSpectrum` from `NotFound` from a
//! storage failure.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use wave_core::api::ApiResponse;
use wave_core::{
    epoch_secs, Connection, ConnectionStatus, InterfaceRef, LinkId, OpticalLink, Pop,
    Router as PopRouter, SlotRange, SlotState, DEFAULT_TOTAL_SLOTS,
};

use crate::error::LinkDbError;
use crate::graph;
use crate::store::LinkDb;

/// Map a domain error onto an HTTP status.
fn error_status(err: &LinkDbError) -> StatusCode {
    match err {
        LinkDbError::NotFound(_) => StatusCode::NOT_FOUND,
        LinkDbError::AlreadyExists(_)
        | LinkDbError::Conflict(_)
        | LinkDbError::NoSpectrum(_)
        | LinkDbError::InterfaceUnavailable(_) => StatusCode::CONFLICT,
        LinkDbError::PathInfeasible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn db_error(err: LinkDbError) -> axum::response::Response {
    (
        error_status(&err),
        Json(ApiResponse::<()>::err(err.to_string())),
    )
        .into_response()
}

/// Build the LinkDB router.
pub fn build_router(db: LinkDb) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/topology", get(topology))
        .route("/api/topology/path/{src}/{dst}", get(path_between))
        .route("/api/pops", get(list_pops).post(create_pop))
        .route("/api/pops/{id}", axum::routing::delete(delete_pop))
        .route("/api/routers", get(list_routers).post(create_router))
        .route(
            "/api/routers/{pop}/{router}",
            axum::routing::delete(delete_router),
        )
        .route("/api/links", get(list_links).post(create_link))
        .route("/api/links/{id}", axum::routing::delete(delete_link))
        .route("/api/links/{id}/utilization", get(link_utilization))
        .route("/api/frequencies/{link_id}", get(frequencies))
        .route("/api/interfaces/reserve", post(reserve_interfaces))
        .route("/api/interfaces/release", post(release_interfaces))
        .route("/api/interfaces/{pop}/{router}", get(list_interfaces))
        .route("/api/vops", get(list_vops).post(put_vop))
        .route("/api/vops/{id}", get(get_vop).delete(delete_vop))
        .route("/api/connections", get(list_connections))
        .route("/api/connections/allocate", post(allocate))
        .route(
            "/api/connections/{id}",
            get(get_connection)
                .put(put_connection)
                .delete(delete_connection),
        )
        .route("/api/connections/{id}/status", put(update_status))
        .route("/api/connections/{id}/release", post(release_slots))
        .with_state(db)
}

// ── Health & topology ──────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct HealthView {
    pub status: String,
    pub pops: usize,
    pub links: usize,
}

async fn health(State(db): State<LinkDb>) -> impl IntoResponse {
    match (db.list_pops(), db.list_links()) {
        (Ok(pops), Ok(links)) => Json(ApiResponse::ok(HealthView {
            status: "healthy".to_string(),
            pops: pops.len(),
            links: links.len(),
        }))
        .into_response(),
        (Err(e), _) | (_, Err(e)) => db_error(e),
    }
}

async fn topology(State(db): State<LinkDb>) -> impl IntoResponse {
    match db.topology() {
        Ok(t) => Json(ApiResponse::ok(t)).into_response(),
        Err(e) => db_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    3
}

/// One candidate path between two POPs.
#[derive(Debug, Serialize, Deserialize)]
pub struct PathView {
    pub links: Vec<LinkId>,
    pub distance_km: f64,
    pub hops: usize,
}

async fn path_between(
    State(db): State<LinkDb>,
    Path((src, dst)): Path<(String, String)>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let links = match db.list_links() {
        Ok(l) => l,
        Err(e) => return db_error(e),
    };
    let paths: Vec<PathView> = graph::k_shortest(&links, &src, &dst, query.k)
        .into_iter()
        .map(|p| PathView {
            hops: p.links.len(),
            links: p.links,
            distance_km: p.distance_km,
        })
        .collect();
    if paths.is_empty() {
        return db_error(LinkDbError::PathInfeasible(format!("{src} -> {dst}")));
    }
    Json(ApiResponse::ok(paths)).into_response()
}

// ── POPs / routers / links ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PopCreate {
    pub pop_id: String,
    pub name: String,
    pub location: String,
    #[serde(default = "default_operator")]
    pub operator: String,
}

fn default_operator() -> String {
    "telco".to_string()
}

async fn create_pop(State(db): State<LinkDb>, Json(req): Json<PopCreate>) -> impl IntoResponse {
    let pop = Pop {
        pop_id: req.pop_id,
        name: req.name,
        location: req.location,
        operator: req.operator,
        created_at: epoch_secs(),
    };
    match db.create_pop(&pop) {
        Ok(()) => (StatusCode::CREATED, Json(ApiResponse::ok(pop))).into_response(),
        Err(e) => db_error(e),
    }
}

async fn list_pops(State(db): State<LinkDb>) -> impl IntoResponse {
    match db.list_pops() {
        Ok(pops) => Json(ApiResponse::ok(pops)).into_response(),
        Err(e) => db_error(e),
    }
}

async fn delete_pop(State(db): State<LinkDb>, Path(id): Path<String>) -> impl IntoResponse {
    match db.delete_pop(&id) {
        Ok(true) => Json(ApiResponse::ok("deleted")).into_response(),
        Ok(false) => db_error(LinkDbError::NotFound(format!("pop {id}"))),
        Err(e) => db_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RouterCreate {
    pub router_id: String,
    pub pop_id: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    "Edgecore".to_string()
}

async fn create_router(State(db): State<LinkDb>, Json(req): Json<RouterCreate>) -> impl IntoResponse {
    let router = PopRouter {
        router_id: req.router_id,
        pop_id: req.pop_id,
        model: req.model,
        created_at: epoch_secs(),
    };
    match db.create_router(&router) {
        Ok(()) => (StatusCode::CREATED, Json(ApiResponse::ok(router))).into_response(),
        Err(e) => db_error(e),
    }
}

async fn list_routers(State(db): State<LinkDb>) -> impl IntoResponse {
    match db.list_routers() {
        Ok(routers) => Json(ApiResponse::ok(routers)).into_response(),
        Err(e) => db_error(e),
    }
}

async fn delete_router(
    State(db): State<LinkDb>,
    Path((pop, router)): Path<(String, String)>,
) -> impl IntoResponse {
    match db.delete_router(&pop, &router) {
        Ok(true) => Json(ApiResponse::ok("deleted")).into_response(),
        Ok(false) => db_error(LinkDbError::NotFound(format!("router {pop}/{router}"))),
        Err(e) => db_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LinkCreate {
    pub link_id: String,
    pub pop_a: String,
    pub pop_b: String,
    pub distance_km: f64,
    #[serde(default = "default_total_slots")]
    pub total_slots: usize,
}

fn default_total_slots() -> usize {
    DEFAULT_TOTAL_SLOTS
}

async fn create_link(State(db): State<LinkDb>, Json(req): Json<LinkCreate>) -> impl IntoResponse {
    let link = OpticalLink::new(
        req.link_id,
        req.pop_a,
        req.pop_b,
        req.distance_km,
        req.total_slots,
        epoch_secs(),
    );
    match db.create_link(&link) {
        Ok(()) => (StatusCode::CREATED, Json(ApiResponse::ok(link))).into_response(),
        Err(e) => db_error(e),
    }
}

async fn list_links(State(db): State<LinkDb>) -> impl IntoResponse {
    match db.list_links() {
        Ok(links) => Json(ApiResponse::ok(links)).into_response(),
        Err(e) => db_error(e),
    }
}

async fn delete_link(State(db): State<LinkDb>, Path(id): Path<String>) -> impl IntoResponse {
    match db.delete_link(&id) {
        Ok(true) => Json(ApiResponse::ok("deleted")).into_response(),
        Ok(false) => db_error(LinkDbError::NotFound(format!("link {id}"))),
        Err(e) => db_error(e),
    }
}

async fn link_utilization(State(db): State<LinkDb>, Path(id): Path<String>) -> impl IntoResponse {
    match db.utilization(&id) {
        Ok(u) => Json(ApiResponse::ok(u)).into_response(),
        Err(e) => db_error(e),
    }
}

/// One slot as reported by `GET /api/frequencies/{link_id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SlotView {
    pub index: usize,
    pub frequency_thz: f64,
    pub state: SlotState,
    pub owner: Option<String>,
}

async fn frequencies(State(db): State<LinkDb>, Path(link_id): Path<String>) -> impl IntoResponse {
    let link = match db.get_link(&link_id) {
        Ok(Some(l)) => l,
        Ok(None) => return db_error(LinkDbError::NotFound(format!("link {link_id}"))),
        Err(e) => return db_error(e),
    };
    let slots: Vec<SlotView> = link
        .slots
        .iter()
        .enumerate()
        .map(|(index, slot)| SlotView {
            index,
            frequency_thz: link.center_frequency_thz(index),
            state: slot.state,
            owner: slot.owner.clone(),
        })
        .collect();
    Json(ApiResponse::ok(slots)).into_response()
}

// ── Interfaces ─────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub vop_id: String,
    pub interfaces: Vec<InterfaceRef>,
}

async fn reserve_interfaces(
    State(db): State<LinkDb>,
    Json(req): Json<ReserveRequest>,
) -> impl IntoResponse {
    match db.reserve_interfaces(&req.vop_id, &req.interfaces) {
        Ok(()) => Json(ApiResponse::ok(req.interfaces.len())).into_response(),
        Err(e) => db_error(e),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub vop_id: String,
}

async fn release_interfaces(
    State(db): State<LinkDb>,
    Json(req): Json<ReleaseRequest>,
) -> impl IntoResponse {
    match db.release_interfaces(&req.vop_id) {
        Ok(count) => Json(ApiResponse::ok(count)).into_response(),
        Err(e) => db_error(e),
    }
}

async fn list_interfaces(
    State(db): State<LinkDb>,
    Path((pop, router)): Path<(String, String)>,
) -> impl IntoResponse {
    match db.list_interfaces(&pop, &router) {
        Ok(interfaces) => Json(ApiResponse::ok(interfaces)).into_response(),
        Err(e) => db_error(e),
    }
}

// ── Virtual operators ──────────────────────────────────────────────

async fn put_vop(
    State(db): State<LinkDb>,
    Json(vop): Json<wave_core::VirtualOperator>,
) -> impl IntoResponse {
    match db.put_vop(&vop) {
        Ok(()) => (StatusCode::CREATED, Json(ApiResponse::ok(vop))).into_response(),
        Err(e) => db_error(e),
    }
}

async fn list_vops(State(db): State<LinkDb>) -> impl IntoResponse {
    match db.list_vops() {
        Ok(vops) => Json(ApiResponse::ok(vops)).into_response(),
        Err(e) => db_error(e),
    }
}

async fn get_vop(State(db): State<LinkDb>, Path(id): Path<String>) -> impl IntoResponse {
    match db.get_vop(&id) {
        Ok(Some(vop)) => Json(ApiResponse::ok(vop)).into_response(),
        Ok(None) => db_error(LinkDbError::NotFound(format!("vop {id}"))),
        Err(e) => db_error(e),
    }
}

async fn delete_vop(State(db): State<LinkDb>, Path(id): Path<String>) -> impl IntoResponse {
    match db.delete_vop(&id) {
        Ok(true) => Json(ApiResponse::ok("deleted")).into_response(),
        Ok(false) => db_error(LinkDbError::NotFound(format!("vop {id}"))),
        Err(e) => db_error(e),
    }
}

// ── Connections & spectrum ─────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateRequest {
    pub connection_id: String,
    pub virtual_operator: String,
    pub path: Vec<LinkId>,
    pub slots_required: usize,
}

/// Result of a successful allocation.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateResponse {
    pub connection_id: String,
    pub slots: SlotRange,
}

async fn allocate(State(db): State<LinkDb>, Json(req): Json<AllocateRequest>) -> impl IntoResponse {
    match db.allocate(
        &req.connection_id,
        &req.virtual_operator,
        &req.path,
        req.slots_required,
    ) {
        Ok(slots) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(AllocateResponse {
                connection_id: req.connection_id,
                slots,
            })),
        )
            .into_response(),
        Err(e) => db_error(e),
    }
}

async fn list_connections(State(db): State<LinkDb>) -> impl IntoResponse {
    match db.list_connections() {
        Ok(conns) => Json(ApiResponse::ok(conns)).into_response(),
        Err(e) => db_error(e),
    }
}

async fn get_connection(State(db): State<LinkDb>, Path(id): Path<String>) -> impl IntoResponse {
    match db.get_connection(&id) {
        Ok(Some(conn)) => Json(ApiResponse::ok(conn)).into_response(),
        Ok(None) => db_error(LinkDbError::NotFound(format!("connection {id}"))),
        Err(e) => db_error(e),
    }
}

async fn put_connection(
    State(db): State<LinkDb>,
    Path(id): Path<String>,
    Json(conn): Json<Connection>,
) -> impl IntoResponse {
    if conn.connection_id != id {
        return db_error(LinkDbError::Conflict(format!(
            "body connection_id {} does not match path {id}",
            conn.connection_id
        )));
    }
    match db.put_connection(&conn) {
        Ok(()) => Json(ApiResponse::ok(conn)).into_response(),
        Err(e) => db_error(e),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ConnectionStatus,
}

async fn update_status(
    State(db): State<LinkDb>,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate>,
) -> impl IntoResponse {
    match db.set_connection_status(&id, req.status) {
        Ok(conn) => Json(ApiResponse::ok(conn)).into_response(),
        Err(e) => db_error(e),
    }
}

async fn release_slots(State(db): State<LinkDb>, Path(id): Path<String>) -> impl IntoResponse {
    match db.release(&id) {
        Ok(count) => Json(ApiResponse::ok(count)).into_response(),
        Err(e) => db_error(e),
    }
}

/// DELETE — release spectrum and delete the record.
async fn delete_connection(State(db): State<LinkDb>, Path(id): Path<String>) -> impl IntoResponse {
    if let Err(e) = db.release(&id) {
        return db_error(e);
    }
    match db.delete_connection(&id) {
        Ok(existed) => Json(ApiResponse::ok(existed)).into_response(),
        Err(e) => db_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_are_distinct() {
        assert_eq!(
            error_status(&LinkDbError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&LinkDbError::NoSpectrum("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_status(&LinkDbError::PathInfeasible("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&LinkDbError::Read("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

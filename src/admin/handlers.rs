use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::security::rate_limit::{BucketLimits, ClientBucket};

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub healthy_backends: usize,
    pub configured_backends: usize,
    pub generation: u64,
    pub rate_limited_clients: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub address: String,
    pub healthy: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let pool = state.pool.status();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if pool.is_exhausted() { "exhausted" } else { "operational" },
        healthy_backends: pool.healthy,
        configured_backends: pool.configured,
        generation: pool.generation,
        rate_limited_clients: state.rate_limiter.as_ref().map(|r| r.len()),
    })
}

fn backend_statuses(state: &AdminState) -> Vec<BackendStatus> {
    state
        .pool
        .all_backends()
        .into_iter()
        .map(|view| BackendStatus {
            address: view.backend.to_string(),
            healthy: view.healthy,
        })
        .collect()
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    Json(backend_statuses(&state))
}

/// Run a sweep now and report the resulting membership.
pub async fn post_health_check(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    state.pool.health_check().await;
    Json(backend_statuses(&state))
}

pub async fn get_clients(
    State(state): State<AdminState>,
) -> Result<Json<Vec<ClientBucket>>, StatusCode> {
    let registry = state.rate_limiter.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(registry.snapshot()))
}

pub async fn put_client(
    State(state): State<AdminState>,
    Path(client): Path<String>,
    Json(limits): Json<BucketLimits>,
) -> Result<Json<ClientBucket>, StatusCode> {
    let registry = state.rate_limiter.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    if limits.capacity == 0 || limits.refill_per_sec == 0 {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    registry.set_limits(&client, limits);
    tracing::info!(
        client = %client,
        capacity = limits.capacity,
        refill_per_sec = limits.refill_per_sec,
        "Client limits updated"
    );
    registry
        .get(&client)
        .map(Json)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn delete_client(
    State(state): State<AdminState>,
    Path(client): Path<String>,
) -> StatusCode {
    match state.rate_limiter.as_ref() {
        Some(registry) if registry.remove(&client) => StatusCode::NO_CONTENT,
        _ => StatusCode::NOT_FOUND,
    }
}

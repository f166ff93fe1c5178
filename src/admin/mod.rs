//! Management API.
//!
//! Served on its own listener and guarded by a bearer token:
//! - `GET    /admin/status`        pool summary
//! - `GET    /admin/backends`      configured backends and membership
//! - `POST   /admin/health-check`  run a sweep now
//! - `GET    /admin/clients`       rate limit buckets
//! - `PUT    /admin/clients/{id}`  insert or update a client's limits
//! - `DELETE /admin/clients/{id}`  forget a client

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::load_balancer::pool::BackendPool;
use crate::security::rate_limit::RateLimiterRegistry;
use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub pool: Arc<BackendPool>,
    pub rate_limiter: Option<Arc<RateLimiterRegistry>>,
    pub api_key: String,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .route("/admin/health-check", post(post_health_check))
        .route("/admin/clients", get(get_clients))
        .route("/admin/clients/{id}", axum::routing::put(put_client).delete(delete_client))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

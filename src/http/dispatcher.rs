//! Per-request dispatch: admission, selection, forwarding.
//!
//! ```text
//! request
//!     → RateLimiterRegistry::allow (optional)    denied  → 429
//!     → BackendPool::next                        none    → 503
//!     → Forwarder::forward                       error   → health_check, then 502
//!     → backend response
//! ```

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;

use crate::http::upstream::{append_forwarded_for, Forwarder};
use crate::load_balancer::pool::BackendPool;
use crate::observability::metrics;
use crate::security::rate_limit::{BucketLimits, RateLimiterRegistry};

/// Admission control applied before backend selection.
#[derive(Debug, Clone)]
pub struct Admission {
    pub registry: Arc<RateLimiterRegistry>,
    pub limits: BucketLimits,
}

/// Routes each request to the next healthy backend.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<BackendPool>,
    admission: Option<Admission>,
    forwarder: Arc<dyn Forwarder>,
}

impl Dispatcher {
    pub fn new(pool: Arc<BackendPool>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            pool,
            admission: None,
            forwarder,
        }
    }

    /// Enable per-client rate limiting.
    pub fn with_rate_limit(mut self, registry: Arc<RateLimiterRegistry>, limits: BucketLimits) -> Self {
        self.admission = Some(Admission { registry, limits });
        self
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiterRegistry>> {
        self.admission.as_ref().map(|a| &a.registry)
    }

    /// Handle one request from `client`.
    pub async fn dispatch(&self, client: IpAddr, mut request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().to_string();
        let client_id = client.to_string();

        if let Some(admission) = &self.admission {
            if !admission.registry.allow(&client_id, admission.limits) {
                tracing::warn!(client = %client_id, "Rate limit exceeded");
                metrics::record_rate_limited();
                metrics::record_request(&method, 429, "none", start);
                return (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
            }
        }

        let Some(backend) = self.pool.next() else {
            tracing::warn!(client = %client_id, "No healthy backends");
            metrics::record_request(&method, 503, "none", start);
            return (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable").into_response();
        };

        tracing::debug!(
            backend = %backend,
            method = %method,
            path = %request.uri().path(),
            "Forwarding request"
        );

        append_forwarded_for(&mut request, client);
        let backend_name = backend.to_string();

        match self.forwarder.forward(&backend, request).await {
            Ok(response) => {
                metrics::record_request(&method, response.status().as_u16(), &backend_name, start);
                response
            }
            Err(e) => {
                tracing::error!(backend = %backend, error = %e, "Error proxying to backend");
                // Prune before replying so the next request sees the new generation.
                // The sweep runs on its own task: a dropped request only drops the handle.
                let pool = self.pool.clone();
                if let Err(e) = tokio::spawn(async move { pool.health_check().await }).await {
                    tracing::error!(error = %e, "Reactive health check task failed");
                }
                metrics::record_request(&method, 502, &backend_name, start);
                (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
            }
        }
    }
}

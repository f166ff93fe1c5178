//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router sending every method and path to the dispatcher
//! - Wire up middleware (request ID, tracing, timeout)
//! - Run the initial health sweep before the pool is served
//! - Spawn background tasks (health monitor, idle bucket eviction)
//! - Serve until the shutdown signal

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::health::{HealthMonitor, HttpProbe};
use crate::http::dispatcher::Dispatcher;
use crate::http::request::{request_id, MakeRequestUuid};
use crate::http::upstream::{Forwarder, HttpForwarder};
use crate::load_balancer::pool::{BackendPool, ProbeSettings};
use crate::security::rate_limit::{BucketLimits, RateLimiterRegistry};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// HTTP server for the distributor.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    pool: Arc<BackendPool>,
    rate_limiter: Option<Arc<RateLimiterRegistry>>,
}

impl HttpServer {
    /// Create the server, probing every backend once before returning.
    pub async fn new(config: ProxyConfig) -> Self {
        let settings = ProbeSettings::from(&config.health_check);
        let pool = BackendPool::initialize(&config.backends, Arc::new(HttpProbe::new()), settings).await;
        Self::with_parts(config, Arc::new(pool), Arc::new(HttpForwarder::new()))
    }

    /// Create the server around an existing pool and forwarder.
    pub fn with_parts(config: ProxyConfig, pool: Arc<BackendPool>, forwarder: Arc<dyn Forwarder>) -> Self {
        let mut dispatcher = Dispatcher::new(pool.clone(), forwarder);
        let rate_limiter = if config.rate_limit.enabled {
            let registry = Arc::new(RateLimiterRegistry::new());
            dispatcher = dispatcher.with_rate_limit(registry.clone(), BucketLimits::from(&config.rate_limit));
            Some(registry)
        } else {
            None
        };

        let router = Self::build_router(&config, AppState { dispatcher });
        Self {
            router,
            config,
            pool,
            rate_limiter,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request),
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(middleware)
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let status = self.pool.status();
        tracing::info!(
            address = %addr,
            healthy = status.healthy,
            configured = status.configured,
            "HTTP server starting"
        );

        if self.config.health_check.enabled {
            let monitor = HealthMonitor::new(self.pool.clone(), self.config.health_check.interval());
            tokio::spawn(monitor.run(shutdown.resubscribe()));
        }

        if let Some(registry) = &self.rate_limiter {
            let rl = &self.config.rate_limit;
            tokio::spawn(registry.clone().run_eviction(
                Duration::from_secs(rl.idle_ttl_secs),
                Duration::from_secs(rl.cleanup_interval_secs),
                shutdown.resubscribe(),
            ));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiterRegistry>> {
        self.rate_limiter.as_ref()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Hands every request to the dispatcher, keyed by the peer IP.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.dispatcher.dispatch(addr.ip(), request).await
}

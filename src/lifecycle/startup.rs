//! Startup orchestration.
//!
//! Order: metrics exporter → backend pool (first health sweep) → admin API
//! → proxy listener. Traffic is only accepted once the pool has been probed.
//! Any startup error is fatal; an exhausted pool is not.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid address {0}: {1}")]
    Address(String, std::net::AddrParseError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Handles to the running listeners.
pub struct Running {
    local_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    server: JoinHandle<std::io::Result<()>>,
    admin: Option<JoinHandle<std::io::Result<()>>>,
    grace: Duration,
}

impl Running {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// Wait for the listeners to drain after shutdown was triggered,
    /// giving up after the configured grace period.
    pub async fn stopped(self) {
        let grace = self.grace;
        let drain = async move {
            match self.server.await {
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
                Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
                Ok(Ok(())) => {}
            }
            if let Some(admin) = self.admin {
                let _ = admin.await;
            }
        };

        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed, abandoning open connections");
        }
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, StartupError> {
    addr.parse()
        .map_err(|e| StartupError::Address(addr.to_string(), e))
}

async fn bind(addr: &str) -> Result<TcpListener, StartupError> {
    let parsed = parse_addr(addr)?;
    TcpListener::bind(parsed).await.map_err(|source| StartupError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Bring every subsystem up and start serving.
pub async fn start(config: ProxyConfig, shutdown: &Shutdown) -> Result<Running, StartupError> {
    if config.observability.metrics_enabled {
        metrics::init_metrics(parse_addr(&config.observability.metrics_address)?)?;
    }

    let grace = Duration::from_secs(config.timeouts.shutdown_secs);
    let bind_address = config.bind_address();
    let admin_config = config.admin.clone();

    let server = HttpServer::new(config).await;

    let (admin, admin_addr) = if admin_config.enabled {
        let listener = bind(&admin_config.bind_address).await?;
        let addr = listener.local_addr().map_err(|source| StartupError::Bind {
            addr: admin_config.bind_address.clone(),
            source,
        })?;
        let router = setup_admin_router(AdminState {
            pool: server.pool().clone(),
            rate_limiter: server.rate_limiter().cloned(),
            api_key: admin_config.api_key.clone(),
        });
        let mut rx = shutdown.subscribe();
        tracing::info!(address = %addr, "Admin API listening");
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.recv().await;
                })
                .await
        });
        (Some(handle), Some(addr))
    } else {
        (None, None)
    };

    let listener = bind(&bind_address).await?;
    let local_addr = listener.local_addr().map_err(|source| StartupError::Bind {
        addr: bind_address.clone(),
        source,
    })?;
    tracing::info!(address = %local_addr, "Load balancer started");

    let server = tokio::spawn(server.run(listener, shutdown.subscribe()));

    Ok(Running {
        local_addr,
        admin_addr,
        server,
        admin,
        grace,
    })
}

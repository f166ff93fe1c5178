//! Health probe transport.
//!
//! The pool only needs one thing from the network: issue a GET to a
//! backend's health endpoint and report the status code. Timeouts are
//! applied by the caller, not by the probe.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

/// Errors from a single probe attempt.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid probe request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("connection error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
}

/// Issues a health request to a URL and reports the response status.
pub trait HealthProbe: Send + Sync + 'static {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<StatusCode, ProbeError>>;
}

/// HTTP prober backed by the hyper-util client.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client<HttpConnector, Body>,
}

impl HttpProbe {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthProbe for HttpProbe {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<StatusCode, ProbeError>> {
        Box::pin(async move {
            let request = Request::builder()
                .method("GET")
                .uri(url)
                .header("user-agent", "distributor-health-check")
                .body(Body::empty())?;

            let response = self.client.request(request).await?;
            Ok(response.status())
        })
    }
}

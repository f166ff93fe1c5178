//! Request forwarding to a chosen backend.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the backend's base address
//! - Preserve method, headers and body; append `X-Forwarded-For`
//! - Stream the backend response back unchanged
//!
//! Any transport error is reported as a `ForwardError`; HTTP error statuses
//! from the backend are ordinary responses.

use std::net::IpAddr;
use axum::body::Body;
use axum::http::{
    header::{HeaderName, HeaderValue},
    uri::{PathAndQuery, Scheme},
    Request, Response, Uri,
};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::load_balancer::backend::Backend;

pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Errors forwarding a request to a backend.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream uri: {0}")]
    Uri(String),

    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
}

/// Sends a request to a backend and returns its response.
pub trait Forwarder: Send + Sync + 'static {
    fn forward<'a>(
        &'a self,
        backend: &'a Backend,
        request: Request<Body>,
    ) -> BoxFuture<'a, Result<Response<Body>, ForwardError>>;
}

/// Forwarder backed by the hyper-util pooled client.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpConnector, Body>,
}

impl HttpForwarder {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder for HttpForwarder {
    fn forward<'a>(
        &'a self,
        backend: &'a Backend,
        mut request: Request<Body>,
    ) -> BoxFuture<'a, Result<Response<Body>, ForwardError>> {
        Box::pin(async move {
            let uri = upstream_uri(backend, request.uri())?;
            *request.uri_mut() = uri;
            let response = self.client.request(request).await?;
            let (parts, body) = response.into_parts();
            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}

/// Join the backend base path and the request path with a single slash.
pub fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    match (base.is_empty(), path.starts_with('/')) {
        (true, true) => path.to_string(),
        (true, false) => format!("/{}", path),
        (false, true) => format!("{}{}", base, path),
        (false, false) => format!("{}/{}", base, path),
    }
}

/// Build the URI of `original` as served by `backend`.
pub fn upstream_uri(backend: &Backend, original: &Uri) -> Result<Uri, ForwardError> {
    let path = join_path(backend.base_path(), original.path());
    let path_and_query = match original.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };

    let mut parts = original.clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority = Some(
        backend
            .authority()
            .parse()
            .map_err(|e| ForwardError::Uri(format!("{}: {}", backend, e)))?,
    );
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|e| ForwardError::Uri(e.to_string()))?,
    );
    Uri::from_parts(parts).map_err(|e| ForwardError::Uri(e.to_string()))
}

/// Append the client address to `X-Forwarded-For`.
pub fn append_forwarded_for(request: &mut Request<Body>, client: IpAddr) {
    let headers = request.headers_mut();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, client),
        None => client.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "/users"), "/users");
        assert_eq!(join_path("/api", "/users"), "/api/users");
        assert_eq!(join_path("/api/", "users"), "/api/users");
        assert_eq!(join_path("", ""), "/");
    }

    #[test]
    fn test_upstream_uri_rewrites_authority_and_keeps_query() {
        let backend = Backend::parse("http://10.0.0.5:3000/v1").unwrap();
        let original: Uri = "/items?id=7".parse().unwrap();
        let uri = upstream_uri(&backend, &original).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.5:3000/v1/items?id=7");
    }

    #[test]
    fn test_upstream_uri_from_absolute_form() {
        let backend = Backend::parse("http://10.0.0.5:3000").unwrap();
        let original: Uri = "http://front.example/a/b".parse().unwrap();
        let uri = upstream_uri(&backend, &original).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.5:3000/a/b");
    }

    #[test]
    fn test_forwarded_for_appends() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        append_forwarded_for(&mut request, "10.1.1.1".parse().unwrap());
        assert_eq!(request.headers()["x-forwarded-for"], "203.0.113.9, 10.1.1.1");
    }
}

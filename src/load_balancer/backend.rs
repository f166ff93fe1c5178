//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server by its base address
//! - Parse configured addresses, skipping malformed ones
//! - Derive health-probe and forwarding URLs
//!
//! A backend has no mutable state of its own. Liveness is expressed by
//! whether the pool's current generation contains it.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Reasons a configured address is rejected.
#[derive(Debug, Error)]
pub enum BackendParseError {
    #[error("not an absolute URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported scheme '{0}' (only http is forwarded)")]
    Scheme(String),

    #[error("missing host")]
    MissingHost,
}

/// A single backend server, identified by its base address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    base_url: Url,
}

impl Backend {
    /// Parse a configured base address such as `http://10.0.0.5:3000`.
    pub fn parse(address: &str) -> Result<Self, BackendParseError> {
        let base_url = Url::parse(address.trim())?;
        if base_url.scheme() != "http" {
            return Err(BackendParseError::Scheme(base_url.scheme().to_string()));
        }
        if base_url.host_str().is_none() {
            return Err(BackendParseError::MissingHost);
        }
        Ok(Self { base_url })
    }

    pub fn url(&self) -> &Url {
        &self.base_url
    }

    /// `host:port` used as the upstream authority.
    pub fn authority(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Base path with no trailing slash ("" for a bare host).
    pub fn base_path(&self) -> &str {
        self.base_url.path().trim_end_matches('/')
    }

    /// Full URL of the health endpoint, e.g. `http://10.0.0.5:3000/health`.
    pub fn health_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_url.as_str().trim_end_matches('/'))
    }
}

/// Parse every configured address, in order.
///
/// Malformed entries are logged and dropped; they never fail startup.
pub fn parse_backends<S: AsRef<str>>(addresses: &[S]) -> Vec<Arc<Backend>> {
    let mut backends: Vec<Arc<Backend>> = Vec::with_capacity(addresses.len());
    for address in addresses {
        let address = address.as_ref();
        match Backend::parse(address) {
            Ok(backend) => {
                if backends.iter().any(|b| **b == backend) {
                    tracing::warn!(address = %address, "Duplicate backend address, skipping");
                    continue;
                }
                backends.push(Arc::new(backend));
            }
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Invalid backend address, skipping");
            }
        }
    }
    backends
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_malformed() {
        let backends = parse_backends(&[
            "http://127.0.0.1:9001",
            "not a url",
            "ftp://127.0.0.1:21",
            "http://127.0.0.1:9002/",
        ]);
        let shown: Vec<String> = backends.iter().map(|b| b.to_string()).collect();
        assert_eq!(shown, vec!["http://127.0.0.1:9001", "http://127.0.0.1:9002"]);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let backends = parse_backends(&["http://a:1", "http://a:1/"]);
        assert_eq!(backends.len(), 1);
    }

    #[test]
    fn test_health_url() {
        let b = Backend::parse("http://127.0.0.1:9001").unwrap();
        assert_eq!(b.health_url("/health"), "http://127.0.0.1:9001/health");

        let b = Backend::parse("http://svc:80/api/").unwrap();
        assert_eq!(b.health_url("/health"), "http://svc/api/health");
        assert_eq!(b.base_path(), "/api");
    }

    #[test]
    fn test_authority_uses_default_port() {
        let b = Backend::parse("http://svc").unwrap();
        assert_eq!(b.authority(), "svc:80");
        assert_eq!(b.base_path(), "");
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Validate socket addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Malformed backend URLs are not errors here; the pool skips them with a warning
//! - Well-formed URLs with a scheme other than `http` are errors: they would never be served

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::load_balancer::backend::{Backend, BackendParseError};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no backends configured")]
    NoBackends,

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("health_check.path must start with '/': {0}")]
    HealthPath(String),

    #[error("{field} is not a valid socket address: {value}")]
    Address { field: &'static str, value: String },

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingApiKey,

    #[error("backend {value} uses unsupported scheme '{scheme}' (only http:// is forwarded)")]
    BackendScheme { value: String, scheme: String },
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    for value in &config.backends {
        if let Err(BackendParseError::Scheme(scheme)) = Backend::parse(value) {
            errors.push(ValidationError::BackendScheme {
                value: value.clone(),
                scheme,
            });
        }
    }

    let hc = &config.health_check;
    for (field, value) in [
        ("health_check.interval_secs", hc.interval_secs),
        ("health_check.timeout_ms", hc.timeout_ms),
        ("health_check.sweep_timeout_ms", hc.sweep_timeout_ms),
        ("health_check.max_concurrent_probes", hc.max_concurrent_probes as u64),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if !hc.path.starts_with('/') {
        errors.push(ValidationError::HealthPath(hc.path.clone()));
    }

    let rl = &config.rate_limit;
    if rl.enabled {
        for (field, value) in [
            ("rate_limit.capacity", rl.capacity as u64),
            ("rate_limit.refill_per_sec", rl.refill_per_sec as u64),
            ("rate_limit.idle_ttl_secs", rl.idle_ttl_secs),
            ("rate_limit.cleanup_interval_secs", rl.cleanup_interval_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError::Zero { field });
            }
        }
    }

    check_addr(&mut errors, "listener.bind_address", &config.bind_address());
    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::MissingApiKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field,
            value: value.to_string(),
        });
    }
}

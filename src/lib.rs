//! HTTP request distributor library.
//!
//! Forwards client requests round-robin across a pool of backends, prunes
//! backends whose health probe fails, and applies per-client token bucket
//! rate limits.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

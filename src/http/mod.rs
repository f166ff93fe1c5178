//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → dispatcher.rs (rate limit → pick backend → forward)
//!     → upstream.rs (rewrite URI, send via hyper client)
//!     → backend response streamed back to the client
//! ```

pub mod dispatcher;
pub mod request;
pub mod server;
pub mod upstream;

pub use dispatcher::Dispatcher;
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::HttpServer;
pub use upstream::{ForwardError, Forwarder, HttpForwarder};

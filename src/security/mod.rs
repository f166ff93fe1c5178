//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client token bucket, keyed by peer IP)
//!     → denied: 429, never reaches backend selection
//! ```

pub mod rate_limit;

pub use rate_limit::{BucketLimits, RateLimiterRegistry, TokenBucket};

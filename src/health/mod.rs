//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:        pool.initialize → first sweep → pool servable
//! Proactive:      monitor.rs timer → pool.health_check()
//! Reactive:       forward failure in dispatcher → pool.health_check()
//!
//! Sweep:
//!     probe.rs GET <backend>/health for every configured backend
//!     → healthy iff 200 within the probe timeout
//!     → healthy subset swapped into the pool as a new generation
//! ```
//!
//! # Design Decisions
//! - Liveness is pool membership, not per-backend mutable state
//! - Probes run with bounded parallelism under one sweep deadline
//! - Errors, timeouts and non-200 statuses are all "unhealthy"

pub mod monitor;
pub mod probe;

pub use monitor::HealthMonitor;
pub use probe::{HealthProbe, HttpProbe, ProbeError};

//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Configured addresses
//!     → backend.rs (parse, skip malformed)
//!     → pool.rs (probe all, keep healthy subset as a generation)
//!     → round_robin.rs (cursor over the current generation)
//!     → Backend for the dispatcher, or None when exhausted
//! ```
//!
//! # Design Decisions
//! - Liveness changes replace the healthy list wholesale
//! - Selection and replacement share one critical section
//! - Exhaustion is a state, never a process exit

pub mod backend;
pub mod pool;
pub mod round_robin;

pub use backend::Backend;
pub use pool::{BackendPool, PoolStatus, ProbeSettings};

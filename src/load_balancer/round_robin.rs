//! Round-robin rotation over one generation of healthy backends.

use std::sync::Arc;
use crate::load_balancer::backend::Backend;

/// Ordered healthy backends plus the cursor into them.
///
/// Invariant: `cursor < backends.len()` whenever the list is non-empty.
#[derive(Debug, Default)]
pub struct Rotation {
    backends: Vec<Arc<Backend>>,
    cursor: usize,
    generation: u64,
}

impl Rotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the backend at the cursor and advance it.
    pub fn next_server(&mut self) -> Option<Arc<Backend>> {
        if self.backends.is_empty() {
            return None;
        }
        let backend = self.backends[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.backends.len();
        Some(backend)
    }

    /// Install a new generation wholesale, clamping the cursor.
    pub fn replace(&mut self, healthy: Vec<Arc<Backend>>) {
        self.backends = healthy;
        if self.cursor >= self.backends.len() {
            self.cursor = 0;
        }
        self.generation += 1;
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

//! Proactive health checking.
//!
//! # Responsibilities
//! - Re-run the pool's health sweep on a fixed interval
//! - Stop when shutdown is signalled

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::load_balancer::pool::BackendPool;

pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(pool: Arc<BackendPool>, interval: Duration) -> Self {
        Self { pool, interval }
    }

    /// Sweep every `interval` until shutdown.
    ///
    /// The first sweep waits one full interval: startup has already probed.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            path = %self.pool.settings().path,
            "Health monitor starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.pool.health_check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

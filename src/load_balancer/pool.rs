//! Backend pool management.
//!
//! # Responsibilities
//! - Hold the full configured backend set and the current healthy generation
//! - Select backends round-robin from the healthy generation
//! - Re-probe every configured backend and swap in the healthy subset
//!
//! # Locking
//! - `rotation` (list + cursor) is one critical section shared by `next`
//!   and the swap at the end of `health_check`
//! - Probing happens outside that lock
//! - `sweep` serialises whole sweeps so an older sweep never overwrites a
//!   newer generation
//! - A caller that queued behind a sweep which began after its own call
//!   reuses that sweep's result instead of probing again

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use axum::http::StatusCode;
use futures_util::stream::{self, StreamExt};
use tokio::time::{self, Instant};

use crate::config::HealthCheckConfig;
use crate::health::probe::HealthProbe;
use crate::load_balancer::backend::{parse_backends, Backend};
use crate::load_balancer::round_robin::Rotation;
use crate::observability::metrics;

/// Probe settings derived from the health check configuration.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub path: String,
    pub probe_timeout: Duration,
    pub sweep_timeout: Duration,
    pub max_concurrent: usize,
}

impl From<&HealthCheckConfig> for ProbeSettings {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            path: config.path.clone(),
            probe_timeout: config.probe_timeout(),
            sweep_timeout: config.sweep_timeout(),
            max_concurrent: config.max_concurrent_probes.max(1),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from(&HealthCheckConfig::default())
    }
}

/// Result of one health sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub healthy: usize,
    pub configured: usize,
    pub generation: u64,
}

impl PoolStatus {
    /// No backend is currently servable.
    pub fn is_exhausted(&self) -> bool {
        self.healthy == 0
    }
}

/// A configured backend together with its membership in the current generation.
#[derive(Debug, Clone)]
pub struct BackendView {
    pub backend: Arc<Backend>,
    pub healthy: bool,
}

/// The set of known backends and the round-robin selector over the healthy ones.
pub struct BackendPool {
    configured: Vec<Arc<Backend>>,
    rotation: Mutex<Rotation>,
    sweep: tokio::sync::Mutex<()>,
    sweeps_started: AtomicU64,
    prober: Arc<dyn HealthProbe>,
    settings: ProbeSettings,
}

impl BackendPool {
    /// Build a pool from configured addresses without probing.
    ///
    /// The pool serves nothing until the first `health_check` completes.
    pub fn new<S: AsRef<str>>(
        addresses: &[S],
        prober: Arc<dyn HealthProbe>,
        settings: ProbeSettings,
    ) -> Self {
        let configured = parse_backends(addresses);
        if configured.is_empty() {
            tracing::warn!("No usable backend addresses configured");
        }
        Self {
            configured,
            rotation: Mutex::new(Rotation::new()),
            sweep: tokio::sync::Mutex::new(()),
            sweeps_started: AtomicU64::new(0),
            prober,
            settings,
        }
    }

    /// Build a pool and run the first health sweep before returning it.
    pub async fn initialize<S: AsRef<str>>(
        addresses: &[S],
        prober: Arc<dyn HealthProbe>,
        settings: ProbeSettings,
    ) -> Self {
        let pool = Self::new(addresses, prober, settings);
        pool.health_check().await;
        pool
    }

    fn rotation(&self) -> MutexGuard<'_, Rotation> {
        self.rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next backend in round-robin order, or `None` when exhausted.
    pub fn next(&self) -> Option<Arc<Backend>> {
        self.rotation().next_server()
    }

    /// Probe every configured backend and swap in the healthy subset.
    ///
    /// All configured backends are probed, not only the currently healthy
    /// ones, so a recovered backend rejoins. Never fails: the worst outcome
    /// is an exhausted pool.
    ///
    /// Concurrent callers are coalesced: if another sweep started after this
    /// call and has completed by the time the lock is acquired, its result
    /// is returned without probing again.
    pub async fn health_check(&self) -> PoolStatus {
        let ticket = self.sweeps_started.load(Ordering::Acquire);
        let _sweep = self.sweep.lock().await;
        if self.sweeps_started.load(Ordering::Acquire) != ticket {
            let status = self.status();
            tracing::debug!(generation = status.generation, "Joined a newer health sweep");
            return status;
        }
        self.sweeps_started.fetch_add(1, Ordering::AcqRel);

        let started = Instant::now();
        let deadline = started + self.settings.sweep_timeout;

        let results: Vec<bool> = stream::iter(self.configured.clone())
            .map(|backend| async move { self.probe_backend(&backend, deadline).await })
            .buffered(self.settings.max_concurrent)
            .collect()
            .await;

        let healthy: Vec<Arc<Backend>> = self
            .configured
            .iter()
            .zip(results.iter())
            .filter(|(_, ok)| **ok)
            .map(|(backend, _)| backend.clone())
            .collect();

        for (backend, ok) in self.configured.iter().zip(results.iter()) {
            metrics::record_backend_health(&backend.to_string(), *ok);
        }

        let status = {
            let mut rotation = self.rotation();
            rotation.replace(healthy);
            PoolStatus {
                healthy: rotation.len(),
                configured: self.configured.len(),
                generation: rotation.generation(),
            }
        };

        metrics::record_health_sweep(status.healthy, started.elapsed());
        if status.is_exhausted() {
            tracing::error!(
                configured = status.configured,
                generation = status.generation,
                "All backends are unavailable"
            );
        } else {
            tracing::info!(
                healthy = status.healthy,
                configured = status.configured,
                generation = status.generation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Backend pool updated"
            );
        }
        status
    }

    async fn probe_backend(&self, backend: &Backend, sweep_deadline: Instant) -> bool {
        let url = backend.health_url(&self.settings.path);
        let deadline = sweep_deadline.min(Instant::now() + self.settings.probe_timeout);

        match time::timeout_at(deadline, self.prober.probe(&url)).await {
            Ok(Ok(status)) if status == StatusCode::OK => true,
            Ok(Ok(status)) => {
                tracing::warn!(backend = %backend, status = %status, "Backend is unavailable: unexpected status");
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = %backend, error = %e, "Backend is unavailable: probe failed");
                false
            }
            Err(_) => {
                tracing::warn!(backend = %backend, "Backend is unavailable: probe timed out");
                false
            }
        }
    }

    /// No backend is currently servable.
    pub fn is_exhausted(&self) -> bool {
        self.rotation().is_empty()
    }

    /// Current healthy generation, in configured order.
    pub fn healthy(&self) -> Vec<Arc<Backend>> {
        self.rotation().backends().to_vec()
    }

    pub fn status(&self) -> PoolStatus {
        let rotation = self.rotation();
        PoolStatus {
            healthy: rotation.len(),
            configured: self.configured.len(),
            generation: rotation.generation(),
        }
    }

    /// Every configured backend with its current membership.
    pub fn all_backends(&self) -> Vec<BackendView> {
        let healthy = self.healthy();
        self.configured
            .iter()
            .map(|backend| BackendView {
                backend: backend.clone(),
                healthy: healthy.contains(backend),
            })
            .collect()
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }
}

impl std::fmt::Debug for BackendPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendPool")
            .field("configured", &self.configured)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::health::probe::ProbeError;
    use futures_util::future::BoxFuture;
    use std::collections::HashMap;

    /// Probe answering from a mutable status table; unknown URLs hang.
    #[derive(Default)]
    pub(crate) struct MockProbe {
        statuses: Mutex<HashMap<String, u16>>,
    }

    impl MockProbe {
        pub(crate) fn set(&self, backend: &str, status: u16) {
            self.statuses
                .lock()
                .unwrap()
                .insert(format!("{}/health", backend), status);
        }
    }

    impl HealthProbe for MockProbe {
        fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<StatusCode, ProbeError>> {
            let status = self.statuses.lock().unwrap().get(url).copied();
            Box::pin(async move {
                match status {
                    Some(code) => Ok(StatusCode::from_u16(code).unwrap()),
                    None => futures_util::future::pending().await,
                }
            })
        }
    }

    const A: &str = "http://10.0.0.1:8080";
    const B: &str = "http://10.0.0.2:8080";
    const C: &str = "http://10.0.0.3:8080";

    fn fast_settings() -> ProbeSettings {
        ProbeSettings {
            probe_timeout: Duration::from_millis(200),
            sweep_timeout: Duration::from_millis(500),
            ..ProbeSettings::default()
        }
    }

    fn names(backends: &[Arc<Backend>]) -> Vec<String> {
        backends.iter().map(|b| b.to_string()).collect()
    }

    #[tokio::test]
    async fn test_round_robin_visits_each_backend_once_per_cycle() {
        let probe = Arc::new(MockProbe::default());
        for b in [A, B, C] {
            probe.set(b, 200);
        }
        let pool = BackendPool::initialize(&[A, B, C], probe, fast_settings()).await;

        let picked: Vec<String> = (0..9).map(|_| pool.next().unwrap().to_string()).collect();
        assert_eq!(picked, [A, B, C, A, B, C, A, B, C]);
    }

    #[tokio::test]
    async fn test_health_check_keeps_healthy_subset_in_order() {
        let probe = Arc::new(MockProbe::default());
        probe.set(A, 200);
        probe.set(B, 500);
        probe.set(C, 200);
        let pool = BackendPool::initialize(&[A, B, C], probe, fast_settings()).await;

        assert_eq!(names(&pool.healthy()), vec![A, C]);
        let views = pool.all_backends();
        assert_eq!(views.len(), 3);
        assert!(!views[1].healthy);
    }

    #[tokio::test]
    async fn test_only_200_counts_as_healthy() {
        let probe = Arc::new(MockProbe::default());
        probe.set(A, 204);
        probe.set(B, 200);
        let pool = BackendPool::initialize(&[A, B], probe, fast_settings()).await;
        assert_eq!(names(&pool.healthy()), vec![B]);
    }

    #[tokio::test]
    async fn test_startup_excludes_unhealthy_backend() {
        let probe = Arc::new(MockProbe::default());
        probe.set(A, 200);
        probe.set(B, 503);
        let pool = BackendPool::initialize(&[A, B], probe, fast_settings()).await;

        assert_eq!(pool.status().healthy, 1);
        assert_eq!(pool.next().unwrap().to_string(), A);
        assert_eq!(pool.next().unwrap().to_string(), A);
    }

    #[tokio::test]
    async fn test_exhaustion_and_recovery() {
        let probe = Arc::new(MockProbe::default());
        probe.set(A, 500);
        probe.set(B, 500);
        let pool = BackendPool::initialize(&[A, B], probe.clone(), fast_settings()).await;

        assert!(pool.is_exhausted());
        assert!(pool.next().is_none());

        // A recovered backend rejoins even though it was not in the last generation.
        probe.set(B, 200);
        let status = pool.health_check().await;
        assert!(!status.is_exhausted());
        assert_eq!(pool.next().unwrap().to_string(), B);
    }

    #[tokio::test]
    async fn test_unparsable_addresses_skipped() {
        let probe = Arc::new(MockProbe::default());
        probe.set(A, 200);
        let pool = BackendPool::initialize(&[A, "::bogus::"], probe, fast_settings()).await;
        assert_eq!(pool.status().configured, 1);
        assert_eq!(pool.status().healthy, 1);
    }

    #[tokio::test]
    async fn test_hung_backends_bounded_by_sweep_deadline() {
        let probe = Arc::new(MockProbe::default());
        probe.set(A, 200);
        // Twenty backends that never answer, two probes at a time.
        let mut addresses = vec![A.to_string()];
        addresses.extend((0..20).map(|i| format!("http://10.1.0.{}:8080", i)));
        let settings = ProbeSettings {
            max_concurrent: 2,
            ..fast_settings()
        };

        let started = std::time::Instant::now();
        let pool = BackendPool::initialize(&addresses, probe, settings).await;
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_secs(2), "sweep took {:?}", elapsed);
        assert_eq!(names(&pool.healthy()), vec![A]);
    }

    #[tokio::test]
    async fn test_swap_starts_new_generation() {
        let probe = Arc::new(MockProbe::default());
        for b in [A, B, C] {
            probe.set(b, 200);
        }
        let pool = BackendPool::initialize(&[A, B, C], probe.clone(), fast_settings()).await;
        assert_eq!(pool.status().generation, 1);
        pool.next();
        pool.next();
        pool.next();
        pool.next();

        probe.set(A, 500);
        let status = pool.health_check().await;
        assert_eq!(status.generation, 2);
        assert_eq!(status.healthy, 2);
        // cursor (1) is still in range of the new list [B, C]
        assert_eq!(pool.next().unwrap().to_string(), C);
        assert_eq!(pool.next().unwrap().to_string(), B);
    }

    #[tokio::test]
    async fn test_health_check_runs_on_spawned_task() {
        let probe = Arc::new(MockProbe::default());
        probe.set(A, 500);
        let pool = Arc::new(BackendPool::initialize(&[A], probe.clone(), fast_settings()).await);
        assert!(pool.is_exhausted());

        probe.set(A, 200);
        let task_pool = pool.clone();
        let status = tokio::spawn(async move { task_pool.health_check().await })
            .await
            .unwrap();
        assert_eq!(status.healthy, 1);
        assert_eq!(pool.next().unwrap().to_string(), A);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queued_health_checks_share_one_sweep() {
        let probe = Arc::new(MockProbe::default());
        probe.set(A, 200);
        probe.set(B, 200);
        // C never answers, so every sweep lasts one probe timeout.
        let pool = Arc::new(BackendPool::initialize(&[A, B, C], probe.clone(), fast_settings()).await);
        assert_eq!(pool.status().generation, 1);

        let started = std::time::Instant::now();
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.health_check().await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().healthy, 2);
        }

        // At most one sweep in flight plus one for everyone queued behind it.
        assert!(pool.status().generation <= 3, "generation {}", pool.status().generation);
        assert!(started.elapsed() < Duration::from_millis(900), "took {:?}", started.elapsed());
    }

    #[test]
    fn test_concurrent_next_is_fair() {
        let probe: Arc<dyn HealthProbe> = Arc::new(MockProbe::default());
        let pool = Arc::new(BackendPool::new(&[A, B, C], probe, fast_settings()));
        pool.rotation().replace(pool.configured.clone());

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..50).map(|_| pool.next().unwrap().to_string()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for h in handles {
            for name in h.join().unwrap() {
                *counts.entry(name).or_default() += 1;
            }
        }
        assert_eq!(counts[A], 100);
        assert_eq!(counts[B], 100);
        assert_eq!(counts[C], 100);
    }
}

//! Per-client token bucket rate limiting.
//!
//! Buckets refill in whole seconds: elapsed time below one second credits
//! nothing, and the refill timestamp only advances when at least one token
//! was added, so rapid calls never lose partial credit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Capacity and refill rate for one client's bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketLimits {
    /// Maximum tokens held.
    pub capacity: u32,
    /// Tokens credited per whole elapsed second.
    pub refill_per_sec: u32,
}

impl BucketLimits {
    pub fn new(capacity: u32, refill_per_sec: u32) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }
}

impl From<&RateLimitConfig> for BucketLimits {
    fn from(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.refill_per_sec)
    }
}

/// A single client's token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    limits: BucketLimits,
    tokens: u32,
    last_refill: Instant,
    last_seen: Instant,
    retired: bool,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(limits: BucketLimits) -> Self {
        Self::new_at(limits, Instant::now())
    }

    pub fn new_at(limits: BucketLimits, now: Instant) -> Self {
        Self {
            limits,
            tokens: limits.capacity,
            last_refill: now,
            last_seen: now,
            retired: false,
        }
    }

    /// Refill, then take one token if any is left.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.last_seen = now;
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let whole_secs = now.saturating_duration_since(self.last_refill).as_secs();
        let added = whole_secs.saturating_mul(u64::from(self.limits.refill_per_sec));
        if added > 0 {
            let filled = (u64::from(self.tokens) + added).min(u64::from(self.limits.capacity));
            self.tokens = filled as u32;
            self.last_refill = now;
        }
    }

    /// Change limits in place; the token count is clamped to the new capacity.
    pub fn set_limits(&mut self, limits: BucketLimits) {
        self.limits = limits;
        self.tokens = self.tokens.min(limits.capacity);
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn limits(&self) -> BucketLimits {
        self.limits
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Point-in-time view of one client's bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientBucket {
    pub client: String,
    pub tokens: u32,
    pub capacity: u32,
    pub refill_per_sec: u32,
}

type SharedBucket = Arc<Mutex<TokenBucket>>;

fn lock(bucket: &SharedBucket) -> MutexGuard<'_, TokenBucket> {
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of per-client buckets, created lazily on first use.
///
/// The map is only locked (per shard) for lookup and insertion. Each bucket
/// has its own mutex, so refilling one client never blocks another.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    buckets: DashMap<String, SharedBucket>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or reject one request from `client`.
    ///
    /// `limits` only apply when this call creates the client's bucket; an
    /// existing bucket keeps the limits it was created with.
    pub fn allow(&self, client: &str, limits: BucketLimits) -> bool {
        loop {
            let bucket = self.bucket(client, limits);
            let mut guard = lock(&bucket);
            // Evicted or removed between lookup and lock: use the map's current bucket.
            if guard.retired {
                continue;
            }
            return guard.allow();
        }
    }

    fn bucket(&self, client: &str, limits: BucketLimits) -> SharedBucket {
        if let Some(existing) = self.buckets.get(client) {
            return existing.value().clone();
        }
        // Atomic get-or-insert: concurrent first requests share one bucket.
        let bucket = self
            .buckets
            .entry(client.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(limits))))
            .value()
            .clone();
        metrics::record_rate_limit_clients(self.buckets.len());
        bucket
    }

    /// Insert a full bucket for `client`, or update an existing one's limits.
    pub fn set_limits(&self, client: &str, limits: BucketLimits) {
        self.buckets
            .entry(client.to_string())
            .and_modify(|bucket| lock(bucket).set_limits(limits))
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(limits))));
    }

    /// Forget a client; returns whether it had a bucket.
    pub fn remove(&self, client: &str) -> bool {
        match self.buckets.remove(client) {
            Some((_, bucket)) => {
                lock(&bucket).retired = true;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, client: &str) -> Option<ClientBucket> {
        self.buckets
            .get(client)
            .map(|entry| view(entry.key(), entry.value()))
    }

    /// All clients, sorted by identifier.
    pub fn snapshot(&self) -> Vec<ClientBucket> {
        let mut clients: Vec<ClientBucket> = self
            .buckets
            .iter()
            .map(|entry| view(entry.key(), entry.value()))
            .collect();
        clients.sort_by(|a, b| a.client.cmp(&b.client));
        clients
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop buckets that have not admitted or rejected anything for `ttl`.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.evict_idle_at(ttl, Instant::now())
    }

    pub fn evict_idle_at(&self, ttl: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let mut bucket = lock(bucket);
            let keep = bucket.idle_for(now) < ttl;
            if !keep {
                bucket.retired = true;
            }
            keep
        });
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.buckets.len(), "Evicted idle rate limit buckets");
            metrics::record_rate_limit_clients(self.buckets.len());
        }
        evicted
    }

    /// Periodically evict idle buckets until shutdown.
    pub async fn run_eviction(
        self: Arc<Self>,
        ttl: Duration,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evict_idle(ttl);
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limit eviction stopping");
                    break;
                }
            }
        }
    }
}

fn view(client: &str, bucket: &SharedBucket) -> ClientBucket {
    let bucket = lock(bucket);
    let limits = bucket.limits();
    ClientBucket {
        client: client.to_string(),
        tokens: bucket.tokens(),
        capacity: limits.capacity,
        refill_per_sec: limits.refill_per_sec,
    }
}

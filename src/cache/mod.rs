//! Content-addressed response cache.
//!
//! [`ResponseCache`] stores completed responses keyed by a SHA-256 hash
//! of `(model id, normalized prompt, recent history)`, so an identical
//! request can be answered without another upstream call. A cache hit
//! bypasses quota and abuse checks entirely — the input already
//! produced a previously-accepted response.
//!
//! # Eviction
//!
//! Exact least-recently-used with a time-to-live. Expiry is amortized:
//! checked on every read and write, so correctness never depends on the
//! optional background sweeper ([`ResponseCache::spawn_sweeper`]).
//! Capacity pressure evicts exactly the least-recently-used entry.
//!
//! # Concurrency
//!
//! One mutex serializes the map and its recency index. Operations are
//! cheap relative to request latency, so contention stays negligible.
//!
//! # Architecture
//!
//! The cache sits in the router above selection, quota, and the
//! provider call. Hit/miss/eviction metrics are emitted through the
//! `metrics` crate; cumulative stats (including an estimated cost
//! savings figure) are exposed read-only via [`ResponseCache::stats`]
//! for operational dashboards.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::telemetry;
use crate::types::{TaskCategory, Turn};

/// History turns folded into the cache key.
const HISTORY_CONTEXT_TURNS: usize = 5;

/// Configuration for the response cache.
///
/// ```rust
/// # use modelmux::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(1_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 1,000.
    pub max_entries: usize,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
    /// Sweep interval for the optional background task. Default: 15 min.
    pub sweep_interval: Duration,
    /// Average USD saved per cache hit, used for the estimated-savings
    /// stat. Default: $0.002 (~1k tokens at budget-model pricing).
    pub avg_cost_per_hit: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(15 * 60),
            avg_cost_per_hit: 0.002,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the background sweep interval.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// Key identifying one cached response.
pub type CacheKey = [u8; 32];

/// A cached completion, as stored and returned.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub response_text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub category: TaskCategory,
    pub selection_reason: String,
}

/// Cumulative cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub total_requests: u64,
    /// hits / (hits + misses); 0.0 before any lookup.
    pub hit_rate: f64,
    /// hits × the configured average cost per request, in USD.
    pub estimated_savings: f64,
}

struct Slot {
    value: CachedResponse,
    created_at: Instant,
    last_used: u64,
}

struct Inner {
    entries: HashMap<CacheKey, Slot>,
    /// Recency index: logical tick → key. The smallest tick is the
    /// least-recently-used entry.
    recency: BTreeMap<u64, CacheKey>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: CacheKey) {
        let tick = self.next_tick();
        if let Some(slot) = self.entries.get_mut(&key) {
            self.recency.remove(&slot.last_used);
            slot.last_used = tick;
            self.recency.insert(tick, key);
        }
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(slot) = self.entries.remove(key) {
            self.recency.remove(&slot.last_used);
        }
    }
}

/// Bounded, time-limited, shared response cache.
pub struct ResponseCache {
    inner: Mutex<Inner>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Create a new response cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            config,
        }
    }

    /// Compute the cache key for a request.
    ///
    /// The prompt is trimmed and lowercased so requests differing only
    /// in surrounding whitespace or letter case alias to one entry.
    /// Only the last five history turns feed the key.
    pub fn key(model_id: &str, prompt: &str, history: &[Turn]) -> CacheKey {
        let normalized = prompt.trim().to_lowercase();
        let start = history.len().saturating_sub(HISTORY_CONTEXT_TURNS);

        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update(b":");
        hasher.update(normalized.as_bytes());
        hasher.update(b":");
        for turn in &history[start..] {
            hasher.update(turn.role.as_str().as_bytes());
            hasher.update(b":");
            hasher.update(turn.content.as_bytes());
            hasher.update(b"|");
        }
        hasher.finalize().into()
    }

    /// Look up a cached response.
    ///
    /// A present, unexpired entry is refreshed to most-recently-used
    /// and returned. An expired entry is dropped and reported as a
    /// miss even though it was physically present.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let expired = inner
            .entries
            .get(key)
            .map(|slot| slot.created_at.elapsed() > self.config.ttl);

        match expired {
            None => {
                inner.misses += 1;
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
            Some(true) => {
                inner.remove(key);
                inner.misses += 1;
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
            Some(false) => {
                inner.touch(*key);
                inner.hits += 1;
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                inner.entries.get(key).map(|slot| slot.value.clone())
            }
        }
    }

    /// Store a response, evicting the least-recently-used entry when
    /// at capacity.
    pub fn insert(&self, key: CacheKey, value: CachedResponse) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        // Re-inserting an existing key replaces in place.
        if inner.entries.contains_key(&key) {
            if let Some(slot) = inner.entries.get_mut(&key) {
                slot.value = value;
                slot.created_at = Instant::now();
            }
            inner.touch(key);
            return;
        }

        if inner.entries.len() >= self.config.max_entries {
            let lru = inner.recency.iter().next().map(|(_, key)| *key);
            if let Some(victim) = lru {
                inner.remove(&victim);
                inner.evictions += 1;
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
            }
        }

        let tick = inner.next_tick();
        inner.recency.insert(tick, key);
        inner.entries.insert(
            key,
            Slot {
                value,
                created_at: Instant::now(),
                last_used: tick,
            },
        );
    }

    /// Drop all expired entries, returning how many were removed.
    ///
    /// Purely an optimization — expiry on read already guarantees
    /// correctness regardless of sweep timing.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.config.ttl;
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, slot)| slot.created_at.elapsed() > ttl)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "cache sweep removed expired entries");
        }
        expired.len()
    }

    /// Spawn a background task sweeping expired entries on the
    /// configured interval. The task runs until the cache is dropped
    /// by all other holders.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep();
                    }
                    None => break,
                }
            }
        })
    }

    /// Cumulative statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let total_requests = inner.hits + inner.misses;
        let hit_rate = if total_requests > 0 {
            inner.hits as f64 / total_requests as f64
        } else {
            0.0
        };
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
            total_requests,
            hit_rate,
            estimated_savings: inner.hits as f64 * self.config.avg_cost_per_hit,
        }
    }

    /// Remove every entry and reset counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.recency.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }
}

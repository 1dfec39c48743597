//! TTL + LRU response cache.
//!
//! Keyed by a request [`Fingerprint`] and backed by a `moka` cache running
//! the LRU eviction policy. Each entry carries its own TTL through an
//! [`Expiry`] policy. Reads never block on writers; moka applies recency
//! updates and evictions in batched maintenance.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use switchyard_types::request::{GenerationRequest, GenerationResponse};

/// Stable hash identifying a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Hash of `(normalized prompt, provider policy, max_tokens, temperature)`.
    ///
    /// The prompt is trimmed and internal whitespace runs collapse to one
    /// space. The policy component is the preferred provider (or `auto`) plus
    /// the context mode, since both change what the caller gets back.
    pub fn of(request: &GenerationRequest) -> Self {
        let mut hasher = Sha256::new();

        let normalized = request.prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        hasher.update(b"prompt:");
        hasher.update(normalized.as_bytes());
        hasher.update(b"\n");

        hasher.update(b"provider:");
        hasher.update(request.preferred_provider.as_deref().unwrap_or("auto").as_bytes());
        hasher.update(b"\n");

        if request.use_context {
            hasher.update(format!("context:{}\n", request.context_top_k).as_bytes());
        } else {
            hasher.update(b"context:off\n");
        }

        hasher.update(format!("max_tokens:{}\n", request.max_tokens).as_bytes());
        hasher.update(format!("temperature:{:016x}\n", request.temperature.to_bits()).as_bytes());

        Fingerprint(format!("{:x}", hasher.finalize()))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short: String = self.0.chars().take(16).collect();
        f.write_str(&short)
    }
}

#[derive(Debug, Clone)]
struct CachedResponse {
    response: GenerationResponse,
    ttl: Duration,
}

/// Expire each entry `ttl` after it was written; an overwrite restarts it.
struct PerEntryTtl;

impl Expiry<Fingerprint, CachedResponse> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &CachedResponse,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &Fingerprint,
        value: &CachedResponse,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room (LRU).
    pub evictions: u64,
    /// Entries removed because their TTL had passed.
    pub expirations: u64,
    pub entries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Removals {
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Concurrent response cache with per-entry TTL and LRU eviction.
pub struct ResponseCache {
    entries: Cache<Fingerprint, CachedResponse>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    removals: Arc<Removals>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("default_ttl", &self.default_ttl)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl ResponseCache {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let removals = Arc::new(Removals::default());
        let listener_removals = Arc::clone(&removals);

        let entries = Cache::builder()
            .max_capacity(capacity.max(1) as u64)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .eviction_listener(move |key: Arc<Fingerprint>, _value, cause| match cause {
                RemovalCause::Size => {
                    listener_removals.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(fingerprint = %key, "Evicted least-recently-used cache entry");
                }
                RemovalCause::Expired => {
                    listener_removals.expirations.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            })
            .build();

        Self {
            entries,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            removals,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Cached response for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &Fingerprint) -> Option<GenerationResponse> {
        match self.entries.get(key) {
            Some(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(cached.response)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite `key`. The least-recently-used entry is evicted
    /// once the cache is over capacity.
    pub fn put(&self, key: Fingerprint, response: GenerationResponse, ttl: Duration) {
        self.entries.insert(key, CachedResponse { response, ttl });
    }

    /// Apply pending evictions and expirations now rather than on the next
    /// maintenance cycle.
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.removals.evictions.load(Ordering::Relaxed),
            expirations: self.removals.expirations.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }
}

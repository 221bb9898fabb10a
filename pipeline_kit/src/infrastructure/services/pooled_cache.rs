// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pooled Cache
//!
//! LRU cache with optional per-entry expiration, used by caching
//! middleware. The recency structure comes from the `lru` crate; this
//! module adds TTL slots, hit/miss accounting, and the domain [`Cache`]
//! port implementation.
//!
//! ## Semantics
//!
//! - `get` promotes the entry to most-recently-used; an expired entry is
//!   evicted and reported as a miss
//! - `set` upserts with an optional TTL (falling back to the cache-wide
//!   default), promotes, and evicts the least-recently-used entry on
//!   overflow
//! - All operations are O(1) amortised and internally synchronized
//!
//! Expiration is lazy: entries are checked when touched, which keeps the
//! hot path free of timer wheels. A cache sized for its working set evicts
//! stale entries through normal LRU turnover.

use pipeline_kit_domain::services::Cache;
use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Counter snapshot returned by [`PooledCache::stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Fraction of reads served from the cache, in `0..=1`
    pub hit_rate: f64,
}

struct CacheSlot<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheSlot<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// LRU cache with optional per-entry TTL.
///
/// Shared by handle; one mutex guards the recency structure.
pub struct PooledCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, CacheSlot<V>>>,
    default_ttl: Option<Duration>,
    counters: CacheCounters,
}

impl<K: Hash + Eq, V: Clone> PooledCache<K, V> {
    /// Creates a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            default_ttl: None,
            counters: CacheCounters::default(),
        }
    }

    /// Sets a TTL applied to entries stored without an explicit one
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Reads and promotes the entry under `key`
    ///
    /// An expired entry is evicted and the read reported as a miss.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired = match inner.get(key) {
            Some(slot) if slot.is_expired(now) => true,
            Some(slot) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(slot.value.clone());
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            inner.pop(key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Upserts the entry under `key`, evicting the LRU entry on overflow
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        let slot = CacheSlot { value, expires_at };
        let mut inner = self.inner.lock();
        let was_full = inner.len() == usize::from(inner.cap());
        let replaces_existing = inner.contains(&key);
        inner.put(key, slot);
        if was_full && !replaces_existing {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes the entry under `key`, returning its value
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().pop(key).map(|slot| slot.value)
    }

    /// Removes every entry
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of entries currently stored (expired ones included until
    /// touched)
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true when the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns the counter snapshot
    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let reads = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            hit_rate: if reads == 0 { 0.0 } else { hits as f64 / reads as f64 },
        }
    }
}

/// The byte-payload projection backs the domain [`Cache`] port, which is
/// what caching middleware consumes.
#[async_trait]
impl Cache for PooledCache<String, Bytes> {
    async fn get(&self, key: &str) -> Option<Bytes> {
        PooledCache::get(self, key)
    }

    async fn set(&self, key: &str, value: Bytes, expiration: Option<Duration>) {
        PooledCache::set(self, key.to_string(), value, expiration);
    }

    async fn remove(&self, key: &str) {
        PooledCache::remove(self, key);
    }

    async fn clear(&self) {
        PooledCache::clear(self);
    }
}

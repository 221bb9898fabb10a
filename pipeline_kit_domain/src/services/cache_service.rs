// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cache Service Interface
//!
//! This module defines the interface consumed by caching middleware. The
//! core never implements caching policy itself; it dispatches through this
//! port and ships one in-memory implementation (`PooledCache`) in the
//! infrastructure layer.
//!
//! ## Overview
//!
//! The `Cache` trait provides a standardized interface for:
//!
//! - **Byte Storage**: Get/set opaque payloads with optional expiration
//! - **Typed Helpers**: JSON-encoded typed values layered on the byte
//!   operations via [`CacheExt`]
//! - **Invalidation**: Per-key removal and whole-cache clearing
//!
//! ## Miss-Through Semantics
//!
//! Typed decode failures are **misses**, never errors: a cache must degrade
//! to recomputing the value, not abort the caller. Only the encoding side
//! surfaces an error, because a caller that cannot serialize its value has a
//! bug worth hearing about.
//!
//! # Thread Safety
//!
//! Implementations must be thread-safe (`Send + Sync`); caching middleware
//! shares one cache handle across concurrent executions.

use crate::error::PipelineError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Cache collaborator port used by caching middleware.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Reads the payload stored under `key`, if present and unexpired
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Stores a payload under `key` with an optional time-to-live
    async fn set(&self, key: &str, value: Bytes, expiration: Option<Duration>);

    /// Removes the entry stored under `key`
    async fn remove(&self, key: &str);

    /// Removes every entry
    async fn clear(&self);
}

/// Typed JSON helpers layered on any [`Cache`].
///
/// Blanket-implemented; callers bring the trait into scope and use
/// `get_json`/`set_json` directly on their cache handle.
#[async_trait]
pub trait CacheExt: Cache {
    /// Reads and decodes a typed value
    ///
    /// Decode failures miss-through: the entry is treated as absent so the
    /// caller falls back to computing the value.
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Encodes and stores a typed value
    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        expiration: Option<Duration>,
    ) -> Result<(), PipelineError> {
        let encoded = serde_json::to_vec(value)?;
        self.set(key, Bytes::from(encoded), expiration).await;
        Ok(())
    }
}

#[async_trait]
impl<C: Cache + ?Sized> CacheExt for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapCache {
        entries: Mutex<HashMap<String, Bytes>>,
    }

    #[async_trait]
    impl Cache for MapCache {
        async fn get(&self, key: &str) -> Option<Bytes> {
            self.entries.lock().get(key).cloned()
        }

        async fn set(&self, key: &str, value: Bytes, _expiration: Option<Duration>) {
            self.entries.lock().insert(key.to_string(), value);
        }

        async fn remove(&self, key: &str) {
            self.entries.lock().remove(key);
        }

        async fn clear(&self) {
            self.entries.lock().clear();
        }
    }

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Cached {
        total: u64,
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let cache = MapCache::default();
        cache.set_json("result", &Cached { total: 9 }, None).await.unwrap();
        let back: Option<Cached> = cache.get_json("result").await;
        assert_eq!(back, Some(Cached { total: 9 }));
    }

    #[tokio::test]
    async fn test_decode_failure_misses_through() {
        let cache = MapCache::default();
        cache.set("result", Bytes::from_static(b"not json"), None).await;
        let back: Option<Cached> = cache.get_json("result").await;
        assert_eq!(back, None);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = MapCache::default();
        cache.set("a", Bytes::from_static(b"1"), None).await;
        cache.set("b", Bytes::from_static(b"2"), None).await;

        cache.remove("a").await;
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());

        cache.clear().await;
        assert!(cache.get("b").await.is_none());
    }
}

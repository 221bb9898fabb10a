// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Object Pool
//!
//! Bounded pool of reusable objects with a factory, an optional reset hook,
//! and a memory-pressure shrink path. Pools amortize the construction cost
//! of expensive objects (contexts, buffers, codecs) across invocations.
//!
//! ## Lifecycle
//!
//! An object is always in exactly one place: the `available` list, out on
//! loan, or dropped. `acquire` pops or synthesizes; `release` runs the
//! reset hook and returns the object unless the hook rejected it or the
//! pool is full, in which case the object drops.
//!
//! ## Scoped Borrowing
//!
//! Auto-return through destructors alone is not reliable when a release
//! must coordinate with async work, so the safe pattern is the scoped
//! borrow: [`Pool::with_borrowed`] acquires, lends the object to the
//! closure, and returns it on **every** exit path - success, error, and
//! caller cancellation alike.
//!
//! ## Memory Pressure
//!
//! A pool registered with a
//! [`MemoryPressureHandler`](super::memory_pressure::MemoryPressureHandler)
//! shrinks on notification: `Warning` halves the cached objects and the
//! admission cap, `Critical` drops down to a floor of one fifth of the
//! configured size, `Normal` restores the configured cap (already-dropped
//! objects are re-synthesized on demand).

use super::memory_pressure::{MemoryPressureHandler, MemoryPressureLevel};
use pipeline_kit_domain::error::PipelineError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Counter snapshot returned by [`Pool::stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStats {
    pub acquisitions: u64,
    pub releases: u64,
    pub allocations: u64,
    pub dropped: u64,
    /// Fraction of acquisitions served from the pool, in `0..=1`
    pub hit_rate: f64,
}

#[derive(Default)]
struct PoolCounters {
    acquisitions: AtomicU64,
    releases: AtomicU64,
    allocations: AtomicU64,
    dropped: AtomicU64,
}

/// Bounded reusable-object pool.
///
/// Shared as `Arc<Pool<T>>`; all operations are internally synchronized.
pub struct Pool<T: Send + 'static> {
    available: Mutex<Vec<T>>,
    /// Current admission cap; lowered under memory pressure.
    max_size: AtomicUsize,
    /// Configured cap restored when pressure subsides.
    base_max_size: usize,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    /// Returns false to reject an object from re-pooling.
    reset: Option<Box<dyn Fn(&mut T) -> bool + Send + Sync>>,
    counters: PoolCounters,
}

impl<T: Send + 'static> Pool<T> {
    /// Creates a pool capped at `max_size` objects
    pub fn new(max_size: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            available: Mutex::new(Vec::new()),
            max_size: AtomicUsize::new(max_size),
            base_max_size: max_size,
            factory: Box::new(factory),
            reset: None,
            counters: PoolCounters::default(),
        }
    }

    /// Installs a reset hook run before an object re-enters the pool
    pub fn with_reset(mut self, reset: impl Fn(&mut T) -> bool + Send + Sync + 'static) -> Self {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Takes an object from the pool, synthesizing one when empty
    pub fn acquire(&self) -> T {
        self.counters.acquisitions.fetch_add(1, Ordering::Relaxed);
        if let Some(item) = self.available.lock().pop() {
            return item;
        }
        self.counters.allocations.fetch_add(1, Ordering::Relaxed);
        (self.factory)()
    }

    /// Returns an object to the pool
    ///
    /// The object drops instead when the reset hook rejects it or the pool
    /// is at its cap.
    pub fn release(&self, mut item: T) {
        self.counters.releases.fetch_add(1, Ordering::Relaxed);
        if let Some(reset) = &self.reset {
            if !reset(&mut item) {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut available = self.available.lock();
        if available.len() < self.max_size.load(Ordering::Acquire) {
            available.push(item);
        } else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Scoped borrow: acquire, lend to `operation`, release on every exit
    /// path
    ///
    /// The object returns to the pool on success, on error, and when the
    /// caller's task is cancelled mid-operation.
    pub async fn with_borrowed<R, F>(&self, operation: F) -> Result<R, PipelineError>
    where
        F: for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, Result<R, PipelineError>>,
    {
        let mut loan = PoolLoan {
            pool: self,
            item: Some(self.acquire()),
        };
        match loan.item.as_mut() {
            Some(item) => operation(item).await,
            None => Err(PipelineError::internal("pool loan lost its object")),
        }
        // `loan` drops here and returns the object on every path.
    }

    /// Pre-fills the pool up to `count` objects (bounded by the cap)
    pub fn prewarm(&self, count: usize) {
        let cap = self.max_size.load(Ordering::Acquire);
        let mut available = self.available.lock();
        while available.len() < count.min(cap) {
            self.counters.allocations.fetch_add(1, Ordering::Relaxed);
            available.push((self.factory)());
        }
    }

    /// Drops every pooled object
    pub fn clear(&self) {
        let mut available = self.available.lock();
        self.counters
            .dropped
            .fetch_add(available.len() as u64, Ordering::Relaxed);
        available.clear();
    }

    /// Number of objects currently pooled
    pub fn available_len(&self) -> usize {
        self.available.lock().len()
    }

    /// Current admission cap
    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::Acquire)
    }

    /// Returns the counter snapshot
    pub fn stats(&self) -> PoolStats {
        let acquisitions = self.counters.acquisitions.load(Ordering::Relaxed);
        let allocations = self.counters.allocations.load(Ordering::Relaxed);
        let hits = acquisitions.saturating_sub(allocations);
        PoolStats {
            acquisitions,
            releases: self.counters.releases.load(Ordering::Relaxed),
            allocations,
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            hit_rate: if acquisitions == 0 {
                0.0
            } else {
                hits as f64 / acquisitions as f64
            },
        }
    }

    /// Applies a memory-pressure level to the pool
    pub fn handle_memory_pressure(&self, level: MemoryPressureLevel) {
        let target_cap = match level {
            MemoryPressureLevel::Normal => self.base_max_size,
            MemoryPressureLevel::Warning => (self.base_max_size / 2).max(1),
            MemoryPressureLevel::Critical => (self.base_max_size / 5).max(1),
        };
        self.max_size.store(target_cap, Ordering::Release);

        let mut available = self.available.lock();
        if available.len() > target_cap {
            let excess = available.len() - target_cap;
            available.truncate(target_cap);
            self.counters.dropped.fetch_add(excess as u64, Ordering::Relaxed);
            debug!(?level, dropped = excess, cap = target_cap, "pool shrank under memory pressure");
        }
    }

    /// Subscribes this pool to a memory-pressure handler
    ///
    /// Holds only a weak reference; a dropped pool silently stops reacting.
    pub fn register_memory_pressure(self: Arc<Self>, handler: &MemoryPressureHandler) -> u64 {
        let pool = Arc::downgrade(&self);
        handler.register(move |level| {
            if let Some(pool) = pool.upgrade() {
                pool.handle_memory_pressure(level);
            }
        })
    }
}

/// Returns the loaned object to its pool on drop.
struct PoolLoan<'p, T: Send + 'static> {
    pool: &'p Pool<T>,
    item: Option<T>,
}

impl<T: Send + 'static> Drop for PoolLoan<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;

    fn counting_pool(max: usize) -> Pool<Vec<u8>> {
        Pool::new(max, || Vec::with_capacity(64))
    }

    #[test]
    fn test_acquire_synthesizes_and_reuses() {
        let pool = counting_pool(4);

        let item = pool.acquire();
        assert_eq!(pool.stats().allocations, 1);
        pool.release(item);
        assert_eq!(pool.available_len(), 1);

        let _again = pool.acquire();
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1, "second acquire must reuse");
        assert_eq!(stats.acquisitions, 2);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_release_beyond_cap_drops() {
        let pool = counting_pool(1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available_len(), 1);
        assert_eq!(pool.stats().dropped, 1);
    }

    #[test]
    fn test_reset_rejection_drops_object() {
        let pool = Pool::new(4, || vec![0u8; 8]).with_reset(|item: &mut Vec<u8>| {
            item.clear();
            // Reject anything that still holds excessive capacity.
            item.capacity() <= 64
        });

        let mut big = pool.acquire();
        big.reserve(1_024);
        pool.release(big);
        assert_eq!(pool.available_len(), 0);
        assert_eq!(pool.stats().dropped, 1);

        let small = pool.acquire();
        pool.release(small);
        assert_eq!(pool.available_len(), 1);
    }

    #[test]
    fn test_prewarm_and_clear() {
        let pool = counting_pool(3);
        pool.prewarm(5);
        assert_eq!(pool.available_len(), 3, "prewarm is bounded by the cap");

        pool.clear();
        assert_eq!(pool.available_len(), 0);
        assert_eq!(pool.stats().dropped, 3);
    }

    #[test]
    fn test_conservation_invariant() {
        let pool = counting_pool(2);
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        pool.release(a);
        pool.release(b);
        pool.release(c); // over cap: dropped

        let stats = pool.stats();
        let loaned = stats.acquisitions - stats.releases;
        assert_eq!(
            stats.allocations,
            loaned + pool.available_len() as u64 + stats.dropped
        );
    }

    #[tokio::test]
    async fn test_with_borrowed_releases_on_success_and_error() {
        let pool = counting_pool(2);

        let ok: Result<usize, _> = pool
            .with_borrowed(|item: &mut Vec<u8>| {
                Box::pin(async move {
                    item.push(1);
                    Ok(item.len())
                })
            })
            .await;
        assert_eq!(ok, Ok(1));
        assert_eq!(pool.available_len(), 1);

        let err: Result<(), _> = pool
            .with_borrowed(|_item: &mut Vec<u8>| Box::pin(async { Err(PipelineError::internal("boom")) }))
            .await;
        assert!(err.is_err());
        assert_eq!(pool.available_len(), 1, "object returned on the error path too");
    }

    #[tokio::test]
    async fn test_with_borrowed_releases_on_cancellation() {
        let pool = Arc::new(counting_pool(2));

        {
            let mut fut = Box::pin(pool.with_borrowed(|_item: &mut Vec<u8>| {
                Box::pin(async {
                    futures::future::pending::<()>().await;
                    Ok(())
                })
            }));
            let waker = futures::task::noop_waker();
            let mut cx = std::task::Context::from_waker(&waker);
            assert!(fut.as_mut().poll(&mut cx).is_pending());
            // Dropping the future cancels the borrow.
        }
        assert_eq!(pool.available_len(), 1, "cancelled borrow still returned its object");
    }

    #[tokio::test]
    async fn test_memory_pressure_shrinks_and_restores() {
        let pool = Arc::new(counting_pool(10));
        pool.prewarm(10);

        pool.handle_memory_pressure(MemoryPressureLevel::Warning);
        assert_eq!(pool.available_len(), 5);
        assert_eq!(pool.max_size(), 5);

        pool.handle_memory_pressure(MemoryPressureLevel::Critical);
        assert_eq!(pool.available_len(), 2);
        assert_eq!(pool.max_size(), 2);

        pool.handle_memory_pressure(MemoryPressureLevel::Normal);
        assert_eq!(pool.max_size(), 10);
        // Dropped objects are not resurrected; they re-synthesize on demand.
        assert_eq!(pool.available_len(), 2);
    }

    #[tokio::test]
    async fn test_pool_subscribes_to_pressure_handler() {
        let handler = MemoryPressureHandler::new();
        let pool = Arc::new(counting_pool(10));
        pool.prewarm(10);
        Arc::clone(&pool).register_memory_pressure(&handler);

        handler.simulate_memory_pressure(MemoryPressureLevel::Warning).await;
        assert_eq!(pool.available_len(), 5);
    }
}

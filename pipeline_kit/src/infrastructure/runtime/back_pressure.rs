// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Back-Pressure Semaphore
//!
//! This module provides the admission-control primitive that bounds both
//! concurrency and queued depth for pipeline execution, preventing resource
//! oversubscription when many commands arrive at once.
//!
//! ## Architecture Pattern: Strategy-Driven Admission
//!
//! **Problem:** A plain counting semaphore only knows how to wait. Under
//! sustained overload the waiter queue grows without bound and every caller
//! eventually times out.
//!
//! **Solution:** Admission combines a concurrency limit with a bounded
//! waiter queue and a [`BackPressureStrategy`] deciding what happens at the
//! boundary:
//!
//! - **Suspend**: enqueue at the tail; fail with `QueueFull` when the queue
//!   is at capacity
//! - **Error**: fail immediately with `Rejected`
//! - **DropOldest**: sacrifice the head waiter (failed with `Dropped`) to
//!   make room, then enqueue the new caller
//! - **DropNewest**: reject the new caller with `Dropped` when full
//!
//! ## Fairness and Exactly-Once Resumption
//!
//! Waiters wake strictly FIFO. Every waiter is resumed exactly once: a
//! grant, a drop, a close, a timeout, or the caller's own cancellation -
//! never two of these. The cancellation path re-checks the queue under the
//! lock; if the grant raced ahead of the cancellation, the permit is handed
//! straight to the next waiter so no slot leaks.
//!
//! ## Permit Discipline
//!
//! Permits are RAII: dropping a [`BackPressurePermit`] releases its slot.
//! [`BackPressurePermit::release`] makes the release explicit at call
//! sites that want it visible. An internal release that would drive the
//! outstanding count negative panics - a double release is a bug, never
//! silently accepted.

use pipeline_kit_domain::error::{BackPressureError, PipelineError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Admission policy applied when the concurrency limit is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackPressureStrategy {
    /// Wait FIFO; fail with `QueueFull` when the queue is at capacity
    Suspend,
    /// Fail immediately with `Rejected`
    Error,
    /// Fail the oldest waiter to admit the new one into the queue
    DropOldest,
    /// Fail the new caller when the queue is at capacity
    DropNewest,
}

impl Default for BackPressureStrategy {
    fn default() -> Self {
        BackPressureStrategy::Suspend
    }
}

/// Configuration for a back-pressure semaphore.
#[derive(Debug, Clone)]
pub struct BackPressureConfig {
    /// Maximum number of concurrently held permits
    pub limit: usize,

    /// Policy applied once `limit` permits are outstanding
    pub strategy: BackPressureStrategy,

    /// Maximum queued waiters; `None` leaves the queue unbounded
    pub max_queue_depth: Option<usize>,
}

impl Default for BackPressureConfig {
    fn default() -> Self {
        Self {
            limit: 1,
            strategy: BackPressureStrategy::default(),
            max_queue_depth: None,
        }
    }
}

/// Counter snapshot returned by [`BackPressureSemaphore::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreStats {
    pub limit: usize,
    pub outstanding: usize,
    pub queued: usize,
    pub total_acquired: u64,
    pub total_rejected: u64,
    pub total_dropped: u64,
    pub total_timed_out: u64,
}

/// Health projection returned by [`BackPressureSemaphore::health_check`].
#[derive(Debug, Clone, PartialEq)]
pub struct SemaphoreHealth {
    pub healthy: bool,
    /// Fraction of the concurrency limit currently in use, in `0..=1`
    pub saturation: f64,
}

#[derive(Debug)]
enum WaitOutcome {
    Granted,
    Dropped,
    Closed,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    tx: oneshot::Sender<WaitOutcome>,
}

#[derive(Debug)]
struct SemaphoreState {
    outstanding: usize,
    waiters: VecDeque<Waiter>,
    closed: bool,
    next_waiter_id: u64,
}

#[derive(Default, Debug)]
struct SemaphoreCounters {
    total_acquired: AtomicU64,
    total_rejected: AtomicU64,
    total_dropped: AtomicU64,
    total_timed_out: AtomicU64,
}

#[derive(Debug)]
struct SemaphoreInner {
    config: BackPressureConfig,
    state: Mutex<SemaphoreState>,
    counters: SemaphoreCounters,
}

impl SemaphoreInner {
    /// Releases one slot: hands it to the first live waiter, or decrements
    /// the outstanding count.
    ///
    /// Panics when called with nothing outstanding - that is a double
    /// release.
    fn release_slot(&self) {
        let mut state = self.state.lock();
        self.release_slot_locked(&mut state);
    }

    fn release_slot_locked(&self, state: &mut SemaphoreState) {
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.tx.send(WaitOutcome::Granted).is_ok() {
                // Slot transferred; outstanding count unchanged.
                self.counters.total_acquired.fetch_add(1, Ordering::Relaxed);
                return;
            }
            // Receiver vanished before unregistering; skip to the next.
        }
        assert!(
            state.outstanding > 0,
            "back-pressure permit released twice; outstanding count would go negative"
        );
        state.outstanding -= 1;
    }
}

/// Counting semaphore with bounded queued depth and pluggable overflow
/// strategy.
///
/// The handle is cheap to clone; all clones share one set of permits, so
/// every pipeline holding the same handle competes for the same slots.
#[derive(Clone)]
pub struct BackPressureSemaphore {
    inner: Arc<SemaphoreInner>,
}

impl BackPressureSemaphore {
    /// Creates a semaphore from the given configuration
    pub fn new(config: BackPressureConfig) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                config,
                state: Mutex::new(SemaphoreState {
                    outstanding: 0,
                    waiters: VecDeque::new(),
                    closed: false,
                    next_waiter_id: 0,
                }),
                counters: SemaphoreCounters::default(),
            }),
        }
    }

    /// Convenience constructor for a limit with the default strategy
    pub fn with_limit(limit: usize) -> Self {
        Self::new(BackPressureConfig {
            limit,
            ..Default::default()
        })
    }

    /// Acquires a permit, applying the configured overflow strategy
    ///
    /// Cancelling the returned future is safe at any point: a queued waiter
    /// is unregistered, and a grant that raced ahead of the cancellation is
    /// forwarded to the next waiter.
    pub async fn acquire(&self) -> Result<BackPressurePermit, PipelineError> {
        let inner = &self.inner;
        let (waiter_id, rx) = {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(PipelineError::BackPressure(BackPressureError::Cancelled));
            }
            if state.outstanding < inner.config.limit {
                state.outstanding += 1;
                inner.counters.total_acquired.fetch_add(1, Ordering::Relaxed);
                return Ok(BackPressurePermit {
                    inner: Some(Arc::clone(inner)),
                });
            }

            let at_capacity = inner
                .config
                .max_queue_depth
                .map(|depth| state.waiters.len() >= depth)
                .unwrap_or(false);

            match inner.config.strategy {
                BackPressureStrategy::Error => {
                    inner.counters.total_rejected.fetch_add(1, Ordering::Relaxed);
                    return Err(PipelineError::BackPressure(BackPressureError::Rejected));
                }
                BackPressureStrategy::Suspend => {
                    if at_capacity {
                        inner.counters.total_rejected.fetch_add(1, Ordering::Relaxed);
                        return Err(PipelineError::BackPressure(BackPressureError::QueueFull));
                    }
                }
                BackPressureStrategy::DropOldest => {
                    if at_capacity {
                        if let Some(oldest) = state.waiters.pop_front() {
                            inner.counters.total_dropped.fetch_add(1, Ordering::Relaxed);
                            let _ = oldest.tx.send(WaitOutcome::Dropped);
                        }
                    }
                }
                BackPressureStrategy::DropNewest => {
                    if at_capacity {
                        inner.counters.total_dropped.fetch_add(1, Ordering::Relaxed);
                        return Err(PipelineError::BackPressure(BackPressureError::Dropped));
                    }
                }
            }

            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { id, tx });
            debug!(waiter_id = id, queued = state.waiters.len(), "caller queued for admission");
            (id, rx)
        };

        // Unregisters the waiter if this future is dropped; declared before
        // the await so it outlives the channel on the cancellation path.
        let registration = WaiterRegistration {
            inner: Arc::clone(inner),
            id: waiter_id,
            armed: true,
        };

        let outcome = rx.await;
        registration.disarm();

        match outcome {
            Ok(WaitOutcome::Granted) => Ok(BackPressurePermit {
                inner: Some(Arc::clone(inner)),
            }),
            Ok(WaitOutcome::Dropped) => Err(PipelineError::BackPressure(BackPressureError::Dropped)),
            Ok(WaitOutcome::Closed) | Err(_) => Err(PipelineError::BackPressure(BackPressureError::Cancelled)),
        }
    }

    /// Attempts to acquire without waiting
    pub fn try_acquire(&self) -> Option<BackPressurePermit> {
        let mut state = self.inner.state.lock();
        if state.closed || state.outstanding >= self.inner.config.limit {
            return None;
        }
        state.outstanding += 1;
        self.inner.counters.total_acquired.fetch_add(1, Ordering::Relaxed);
        Some(BackPressurePermit {
            inner: Some(Arc::clone(&self.inner)),
        })
    }

    /// Acquires with a wall-clock deadline
    ///
    /// On timeout the queued waiter is removed and `Timeout` returned; the
    /// waiter is never resumed a second time afterwards.
    pub async fn acquire_timeout(&self, limit: Duration) -> Result<BackPressurePermit, PipelineError> {
        match tokio::time::timeout(limit, self.acquire()).await {
            Ok(result) => result,
            Err(_) => {
                self.inner.counters.total_timed_out.fetch_add(1, Ordering::Relaxed);
                Err(PipelineError::timeout(limit))
            }
        }
    }

    /// Bounded wait that reports success as a boolean
    ///
    /// The acquired permit is dropped on return.
    pub async fn wait(&self, limit: Duration) -> bool {
        self.acquire_timeout(limit).await.is_ok()
    }

    /// Closes the semaphore
    ///
    /// All queued waiters are resumed with `Cancelled`; every later acquire
    /// fails immediately.
    pub fn close(&self) {
        let drained: Vec<Waiter> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.waiters.drain(..).collect()
        };
        debug!(drained = drained.len(), "back-pressure semaphore closed");
        for waiter in drained {
            let _ = waiter.tx.send(WaitOutcome::Closed);
        }
    }

    /// Returns the counter snapshot
    pub fn stats(&self) -> SemaphoreStats {
        let state = self.inner.state.lock();
        SemaphoreStats {
            limit: self.inner.config.limit,
            outstanding: state.outstanding,
            queued: state.waiters.len(),
            total_acquired: self.inner.counters.total_acquired.load(Ordering::Relaxed),
            total_rejected: self.inner.counters.total_rejected.load(Ordering::Relaxed),
            total_dropped: self.inner.counters.total_dropped.load(Ordering::Relaxed),
            total_timed_out: self.inner.counters.total_timed_out.load(Ordering::Relaxed),
        }
    }

    /// Reports health and saturation
    pub fn health_check(&self) -> SemaphoreHealth {
        let state = self.inner.state.lock();
        let saturation = if self.inner.config.limit == 0 {
            1.0
        } else {
            state.outstanding as f64 / self.inner.config.limit as f64
        };
        let queue_full = self
            .inner
            .config
            .max_queue_depth
            .map(|depth| state.waiters.len() >= depth)
            .unwrap_or(false);
        SemaphoreHealth {
            healthy: !state.closed && !queue_full,
            saturation,
        }
    }
}

/// Unregisters a queued waiter when the acquiring future is cancelled.
struct WaiterRegistration {
    inner: Arc<SemaphoreInner>,
    id: u64,
    armed: bool,
}

impl WaiterRegistration {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WaiterRegistration {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state.lock();
        if let Some(position) = state.waiters.iter().position(|w| w.id == self.id) {
            // Still queued: remove before the grant could reach it.
            state.waiters.remove(position);
        } else if !state.closed {
            // The grant raced ahead of the cancellation and is now lost in
            // the dropped channel; pass the slot along.
            self.inner.release_slot_locked(&mut state);
        }
    }
}

/// RAII permit for one admission slot.
///
/// Dropping the permit releases the slot; [`release`](Self::release) does
/// the same explicitly.
#[derive(Debug)]
pub struct BackPressurePermit {
    inner: Option<Arc<SemaphoreInner>>,
}

impl BackPressurePermit {
    /// Releases the permit explicitly
    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release_slot();
        }
    }
}

impl Drop for BackPressurePermit {
    fn drop(&mut self) {
        self.release_now();
    }
}

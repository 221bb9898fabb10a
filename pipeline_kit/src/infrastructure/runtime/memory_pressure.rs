// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Memory Pressure Handler
//!
//! Fan-out of memory-pressure notifications to registered subscribers.
//! Object pools register shrink callbacks here; other components may react
//! however they like. Pressure can originate from a platform signal or be
//! simulated, which is also how tests drive the shrink behavior.
//!
//! Callbacks run concurrently on the runtime; a panicking callback is
//! logged and isolated - it never takes down the notifier or its sibling
//! subscribers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Pressure severity reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressureLevel {
    /// Pressure subsided; pools may restore their capacity
    Normal,
    /// Shrink reclaimable state by roughly half
    Warning,
    /// Shrink to the survival floor
    Critical,
}

type PressureCallback = Arc<dyn Fn(MemoryPressureLevel) + Send + Sync>;

/// Registry of memory-pressure subscribers.
///
/// Shared by handle; registration returns an ID used to unregister.
pub struct MemoryPressureHandler {
    subscribers: Mutex<HashMap<u64, PressureCallback>>,
    next_id: AtomicU64,
}

impl MemoryPressureHandler {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a callback; returns its subscription ID
    pub fn register(&self, callback: impl Fn(MemoryPressureLevel) + Send + Sync + 'static) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, Arc::new(callback));
        id
    }

    /// Removes a subscription; returns whether it existed
    pub fn unregister(&self, id: u64) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    /// Number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Delivers a pressure level to every subscriber
    ///
    /// Callbacks run concurrently as supervised tasks; the call returns
    /// once all of them finished. A panicking callback is logged and does
    /// not affect the others.
    pub async fn simulate_memory_pressure(&self, level: MemoryPressureLevel) {
        let callbacks: Vec<(u64, PressureCallback)> = {
            let subscribers = self.subscribers.lock();
            subscribers.iter().map(|(id, cb)| (*id, Arc::clone(cb))).collect()
        };
        debug!(?level, subscribers = callbacks.len(), "delivering memory pressure");

        let tasks: Vec<_> = callbacks
            .into_iter()
            .map(|(id, callback)| {
                tokio::spawn(async move {
                    callback(level);
                    id
                })
            })
            .collect();

        for task in tasks {
            if let Err(join_error) = task.await {
                if join_error.is_panic() {
                    error!(error = %join_error, "memory pressure callback panicked");
                }
            }
        }
    }
}

impl Default for MemoryPressureHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_register_and_notify() {
        let handler = MemoryPressureHandler::new();
        let observed = Arc::new(Mutex::new(Vec::new()));

        let observed_clone = Arc::clone(&observed);
        handler.register(move |level| observed_clone.lock().push(level));
        assert_eq!(handler.subscriber_count(), 1);

        handler.simulate_memory_pressure(MemoryPressureLevel::Warning).await;
        handler.simulate_memory_pressure(MemoryPressureLevel::Critical).await;
        assert_eq!(
            observed.lock().as_slice(),
            [MemoryPressureLevel::Warning, MemoryPressureLevel::Critical]
        );
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let handler = MemoryPressureHandler::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = Arc::clone(&calls);
        let id = handler.register(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        handler.simulate_memory_pressure(MemoryPressureLevel::Warning).await;
        assert!(handler.unregister(id));
        assert!(!handler.unregister(id));
        handler.simulate_memory_pressure(MemoryPressureLevel::Warning).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_callback_is_isolated() {
        let handler = MemoryPressureHandler::new();
        let survivor_calls = Arc::new(AtomicUsize::new(0));

        handler.register(|_| panic!("subscriber bug"));
        let survivor = Arc::clone(&survivor_calls);
        handler.register(move |_| {
            survivor.fetch_add(1, Ordering::SeqCst);
        });

        handler.simulate_memory_pressure(MemoryPressureLevel::Critical).await;
        assert_eq!(survivor_calls.load(Ordering::SeqCst), 1);
    }
}

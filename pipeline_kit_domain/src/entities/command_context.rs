// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Context Entity
//!
//! The `CommandContext` entity is the per-invocation state carrier of the
//! dispatch runtime. It travels with a command through every middleware and
//! into the handler's observability surface, collecting typed values,
//! request-scoped metrics, and metadata along the way.
//!
//! ## Overview
//!
//! The context acts as a stateful carrier object that:
//!
//! - **Stores Typed Values**: A typed key→value map where keys are zero-sized
//!   marker types, so distinct keys can never collide
//! - **Carries Metadata**: Command ID, correlation ID, user attribution, and
//!   the invocation timestamp
//! - **Collects Metrics**: A request-scoped name→number bag for middleware
//!   and handler measurements
//! - **Supports Forking**: Cheap copy-on-write children for parallel
//!   middleware branches
//!
//! ## Entity Characteristics
//!
//! - **Single Owner**: A context belongs to exactly one invocation;
//!   ownership passes into the pipeline for the duration of execution
//! - **Thread-Safe Interior**: Reads may proceed in parallel; writes are
//!   serialized through an interior lock
//! - **Fork Isolation**: Writes to a fork never change observations made
//!   through the parent, and vice versa
//!
//! ## Key Model
//!
//! A key is a zero-sized marker type implementing [`ContextKey`] with an
//! associated `Value` type. The map is keyed by the marker's `TypeId`, so
//! collisions between distinct key types are impossible by construction:
//!
//! ```
//! use pipeline_kit_domain::entities::{CommandContext, ContextKey};
//!
//! struct TenantKey;
//! impl ContextKey for TenantKey {
//!     type Value = String;
//! }
//!
//! let context = CommandContext::default();
//! context.set::<TenantKey>("acme".to_string());
//! assert_eq!(context.get::<TenantKey>().as_deref(), Some(&"acme".to_string()));
//! ```
//!
//! ## Fork / Merge
//!
//! `fork()` snapshots the typed map; values are shared through `Arc` until
//! either side writes, which replaces that side's entry only. `merge(other)`
//! copies every key from `other` into `self`, overwriting on conflict
//! (last-writer-wins; container values are replaced, never appended). This
//! pair is the foundation of the parallel-middleware pattern: each branch
//! receives a fork, and completed forks may be merged back.

use crate::entities::CommandMetadata;
use parking_lot::RwLock;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Zero-sized marker identifying one typed slot in a [`CommandContext`].
///
/// Implementors are unit structs; the associated `Value` is what the slot
/// stores. The marker's `TypeId` keys the map, so two distinct key types can
/// never collide even when their value types match.
pub trait ContextKey: 'static {
    /// The value type stored under this key
    type Value: Send + Sync + 'static;

    /// Stable human-readable name used in diagnostic snapshots
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// One stored slot: the key's diagnostic name plus the shared value.
#[derive(Clone)]
struct StoredValue {
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Diagnostic projection of a context, for logging and introspection only.
///
/// Serializes outward for log pipelines; never read back in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub keys: Vec<&'static str>,
}

/// Per-invocation state carrier threaded through the middleware chain.
///
/// The context is owned by a single invocation. Its interior is synchronized
/// so middleware running on any worker may read concurrently; writes are
/// serialized through the interior lock. It is *not* a broadcast primitive -
/// sharing state across invocations is what [`fork`](CommandContext::fork)
/// and explicit merging are for.
///
/// ## Concurrency
///
/// - Reads take the shared lock and may proceed in parallel
/// - Writes take the exclusive lock and are serialized per context
/// - No lock is held across an `await`; every operation completes
///   synchronously
pub struct CommandContext {
    // Identity fields (always first)
    metadata: CommandMetadata,

    // Core state
    values: RwLock<HashMap<TypeId, StoredValue>>,
    metrics: RwLock<HashMap<String, f64>>,

    // Opaque span/trace handle; the domain stays agnostic of the tracing
    // backend, so the handle is type-erased
    trace_handle: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
}

impl CommandContext {
    /// Creates a context carrying the given metadata
    pub fn new(metadata: CommandMetadata) -> Self {
        Self {
            metadata,
            values: RwLock::new(HashMap::new()),
            metrics: RwLock::new(HashMap::new()),
            trace_handle: RwLock::new(None),
        }
    }

    /// Returns the invocation metadata
    pub fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    /// Reads the value stored under key `K`
    ///
    /// Values are shared, not copied: the returned `Arc` points at the same
    /// allocation the map holds, so repeated reads are cheap.
    pub fn get<K: ContextKey>(&self) -> Option<Arc<K::Value>> {
        let values = self.values.read();
        let stored = values.get(&TypeId::of::<K>())?;
        // The map is only ever populated through set::<K>, so the downcast
        // cannot fail for a present entry.
        Arc::clone(&stored.value).downcast::<K::Value>().ok()
    }

    /// Stores `value` under key `K`, overwriting any previous value
    pub fn set<K: ContextKey>(&self, value: K::Value) {
        let mut values = self.values.write();
        values.insert(
            TypeId::of::<K>(),
            StoredValue {
                name: K::name(),
                value: Arc::new(value),
            },
        );
    }

    /// Removes the value stored under key `K`, returning it if present
    pub fn remove<K: ContextKey>(&self) -> Option<Arc<K::Value>> {
        let mut values = self.values.write();
        let stored = values.remove(&TypeId::of::<K>())?;
        stored.value.downcast::<K::Value>().ok()
    }

    /// Returns true when a value is stored under key `K`
    pub fn contains<K: ContextKey>(&self) -> bool {
        self.values.read().contains_key(&TypeId::of::<K>())
    }

    /// Copies every key from `other` into this context
    ///
    /// Conflicting keys are overwritten (last-writer-wins). Container values
    /// are replaced wholesale, never appended.
    pub fn merge(&self, other: &CommandContext) {
        let incoming: Vec<(TypeId, StoredValue)> = {
            let theirs = other.values.read();
            theirs.iter().map(|(k, v)| (*k, v.clone())).collect()
        };
        let mut values = self.values.write();
        for (key, stored) in incoming {
            values.insert(key, stored);
        }
    }

    /// Forks a child context owning a copy-on-write snapshot
    ///
    /// The child starts with the parent's metadata and typed values; value
    /// allocations are shared through `Arc` until either side writes, which
    /// replaces only that side's entry. The metrics bag starts empty - forks
    /// measure their own branch.
    pub fn fork(&self) -> CommandContext {
        let snapshot = self.values.read().clone();
        CommandContext {
            metadata: self.metadata.clone(),
            values: RwLock::new(snapshot),
            metrics: RwLock::new(HashMap::new()),
            trace_handle: RwLock::new(self.trace_handle.read().clone()),
        }
    }

    /// Produces a diagnostic snapshot (identifiers and key names only)
    pub fn snapshot(&self) -> ContextSnapshot {
        let keys = {
            let values = self.values.read();
            let mut keys: Vec<&'static str> = values.values().map(|stored| stored.name).collect();
            keys.sort_unstable();
            keys
        };
        ContextSnapshot {
            user_id: self.metadata.user_id().map(str::to_string),
            correlation_id: self.metadata.correlation_id().map(str::to_string),
            keys,
        }
    }

    /// Records a request-scoped metric, overwriting any previous value
    pub fn record_metric(&self, name: impl Into<String>, value: f64) {
        self.metrics.write().insert(name.into(), value);
    }

    /// Adds `delta` to a request-scoped metric, creating it at zero
    pub fn add_to_metric(&self, name: impl Into<String>, delta: f64) {
        let mut metrics = self.metrics.write();
        *metrics.entry(name.into()).or_insert(0.0) += delta;
    }

    /// Reads one request-scoped metric
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.read().get(name).copied()
    }

    /// Returns a copy of the whole request-scoped metrics bag
    pub fn metrics_snapshot(&self) -> HashMap<String, f64> {
        self.metrics.read().clone()
    }

    /// Attaches an opaque span/trace handle
    pub fn set_trace_handle<T: Send + Sync + 'static>(&self, handle: T) {
        *self.trace_handle.write() = Some(Arc::new(handle));
    }

    /// Reads the span/trace handle back at its concrete type
    pub fn trace_handle<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let guard = self.trace_handle.read();
        let handle = guard.as_ref()?;
        Arc::clone(handle).downcast::<T>().ok()
    }

    /// Number of typed values currently stored
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true when no typed values are stored
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new(CommandMetadata::new())
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("command_id", &self.metadata.command_id())
            .field("keys", &self.snapshot().keys)
            .finish()
    }
}

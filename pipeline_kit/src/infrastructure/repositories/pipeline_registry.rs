// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Registry
//!
//! Type- and name-keyed repository of built pipelines. Inside a pipeline
//! everything is statically typed; the registry is the one place where type
//! erasure happens, so callers can look up "the pipeline for this command
//! type" at runtime.
//!
//! ## Key Model
//!
//! The primary map is keyed by `(TypeId, name)`; a secondary index maps
//! each command type to its registration names. The default name is
//! `"default"`. Re-registering a key replaces the entry (the secondary
//! index is detached first, then reattached) and refreshes `created_at`.
//!
//! ## Erased Dispatch
//!
//! Entries store the monomorphized `Pipeline<C>` behind `dyn Any`; lookups
//! downcast back to the concrete type. The downcast cannot fail for
//! entries inserted through [`PipelineRegistry::register`], because the map
//! key *is* the command's `TypeId`.
//!
//! ## Sharing
//!
//! A process-wide shared instance is possible (wrap in `Arc`), but
//! dependency injection of explicit instances is the intended pattern;
//! tests construct private registries.

use crate::application::services::pipeline_service::Pipeline;
use pipeline_kit_domain::entities::CommandContext;
use pipeline_kit_domain::error::PipelineError;
use pipeline_kit_domain::services::Command;
use pipeline_kit_domain::value_objects::RegistryKey;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Statistics snapshot returned by [`PipelineRegistry::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub pipeline_count: usize,
    pub command_type_count: usize,
    /// Registrations per command type name
    pub pipelines_by_type: HashMap<String, usize>,
}

struct RegistryEntry {
    pipeline: Box<dyn Any + Send + Sync>,
    key: RegistryKey,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<(TypeId, String), RegistryEntry>,
    by_type: HashMap<TypeId, BTreeSet<String>>,
}

/// Thread-safe registry of built pipelines, keyed by command type and
/// name.
#[derive(Default)]
pub struct PipelineRegistry {
    state: RwLock<RegistryState>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipeline under `(C, name)`, replacing any existing
    /// registration for that key
    pub fn register<C: Command>(&self, pipeline: Pipeline<C>, name: Option<&str>) {
        let name = name.unwrap_or(RegistryKey::DEFAULT_NAME).to_string();
        let type_id = TypeId::of::<C>();
        let key = RegistryKey::new(C::command_type(), name.clone());
        debug!(key = %key, "registering pipeline");

        let mut state = self.state.write();
        if state.entries.remove(&(type_id, name.clone())).is_some() {
            // Detach from the secondary index before reinserting.
            if let Some(names) = state.by_type.get_mut(&type_id) {
                names.remove(&name);
            }
        }
        state.entries.insert(
            (type_id, name.clone()),
            RegistryEntry {
                pipeline: Box::new(pipeline),
                key,
                created_at: chrono::Utc::now(),
            },
        );
        state.by_type.entry(type_id).or_default().insert(name);
    }

    /// Looks up the pipeline registered under `(C, name)`
    pub fn pipeline<C: Command>(&self, name: Option<&str>) -> Option<Pipeline<C>> {
        let name = name.unwrap_or(RegistryKey::DEFAULT_NAME);
        let state = self.state.read();
        let entry = state.entries.get(&(TypeId::of::<C>(), name.to_string()))?;
        entry.pipeline.downcast_ref::<Pipeline<C>>().cloned()
    }

    /// Returns every pipeline registered for command type `C`
    pub fn pipelines<C: Command>(&self) -> Vec<Pipeline<C>> {
        let state = self.state.read();
        let Some(names) = state.by_type.get(&TypeId::of::<C>()) else {
            return Vec::new();
        };
        names
            .iter()
            .filter_map(|name| state.entries.get(&(TypeId::of::<C>(), name.clone())))
            .filter_map(|entry| entry.pipeline.downcast_ref::<Pipeline<C>>().cloned())
            .collect()
    }

    /// Executes `command` through its default pipeline with a fresh context
    pub async fn execute<C: Command>(&self, command: C) -> Result<C::Output, PipelineError> {
        let mut context = CommandContext::default();
        self.execute_in(command, None, &mut context).await
    }

    /// Executes `command` through a named pipeline with a fresh context
    pub async fn execute_named<C: Command>(&self, command: C, name: &str) -> Result<C::Output, PipelineError> {
        let mut context = CommandContext::default();
        self.execute_in(command, Some(name), &mut context).await
    }

    /// Executes `command` through the pipeline under `(C, name)` with the
    /// caller's context
    ///
    /// Fails with `HandlerNotFound` when no pipeline is registered.
    pub async fn execute_in<C: Command>(
        &self,
        command: C,
        name: Option<&str>,
        context: &mut CommandContext,
    ) -> Result<C::Output, PipelineError> {
        let pipeline = self
            .pipeline::<C>(name)
            .ok_or_else(|| PipelineError::handler_not_found(C::command_type(), name))?;
        pipeline.execute(command, context).await
    }

    /// Removes the registration under `(C, name)`; returns whether it
    /// existed
    pub fn remove<C: Command>(&self, name: Option<&str>) -> bool {
        let name = name.unwrap_or(RegistryKey::DEFAULT_NAME).to_string();
        let type_id = TypeId::of::<C>();
        let mut state = self.state.write();
        let removed = state.entries.remove(&(type_id, name.clone())).is_some();
        if removed {
            if let Some(names) = state.by_type.get_mut(&type_id) {
                names.remove(&name);
                if names.is_empty() {
                    state.by_type.remove(&type_id);
                }
            }
        }
        removed
    }

    /// Removes every registration for command type `C`; returns the count
    pub fn remove_all_for<C: Command>(&self) -> usize {
        let type_id = TypeId::of::<C>();
        let mut state = self.state.write();
        let Some(names) = state.by_type.remove(&type_id) else {
            return 0;
        };
        let mut removed = 0;
        for name in names {
            if state.entries.remove(&(type_id, name)).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Removes every registration
    pub fn remove_all(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.by_type.clear();
    }

    /// Lists every registration key
    pub fn keys(&self) -> Vec<RegistryKey> {
        let state = self.state.read();
        let mut keys: Vec<RegistryKey> = state.entries.values().map(|entry| entry.key.clone()).collect();
        keys.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        keys
    }

    /// Registration timestamp for `(C, name)`
    pub fn registered_at<C: Command>(&self, name: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
        let name = name.unwrap_or(RegistryKey::DEFAULT_NAME);
        let state = self.state.read();
        state
            .entries
            .get(&(TypeId::of::<C>(), name.to_string()))
            .map(|entry| entry.created_at)
    }

    /// Returns the statistics snapshot
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        let mut pipelines_by_type: HashMap<String, usize> = HashMap::new();
        for entry in state.entries.values() {
            *pipelines_by_type
                .entry(entry.key.command_type().to_string())
                .or_insert(0) += 1;
        }
        RegistryStats {
            pipeline_count: state.entries.len(),
            command_type_count: state.by_type.len(),
            pipelines_by_type,
        }
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PipelineKit Domain
//!
//! The domain layer of the PipelineKit command-dispatch runtime. It holds
//! the core business contracts and is completely independent of external
//! concerns like runtimes, exporters, or storage backends - those live in
//! the `pipeline-kit` implementation crate.
//!
//! ## Domain-Driven Design Concepts
//!
//! ### Entities
//! Objects with identity and mutable state:
//!
//! - [`CommandContext`](entities::CommandContext): per-invocation typed
//!   state carrier with fork/merge semantics
//! - [`CommandMetadata`](entities::CommandMetadata): identification of one
//!   invocation
//!
//! ### Value Objects
//! Immutable, self-validating values:
//!
//! - [`CommandId`](value_objects::CommandId): ULID-backed invocation ID
//! - [`ExecutionPriority`](value_objects::ExecutionPriority): ordered
//!   middleware phases
//! - [`RegistryKey`](value_objects::RegistryKey): composite registration key
//!
//! ### Domain Services and Ports
//! Contracts the runtime is built against:
//!
//! - [`Command`](services::Command) / [`CommandHandler`](services::CommandHandler):
//!   typed command → typed result
//! - [`Middleware`](services::Middleware) with the
//!   [`Next`](services::Next) continuation and its exactly-once
//!   [`NextGuard`](services::NextGuard)
//! - [`Cache`](services::Cache), [`MetricsRecorder`](services::MetricsRecorder),
//!   [`JournalStorage`](services::JournalStorage): replaceable collaborator
//!   ports
//!
//! ### Errors
//! One typed taxonomy, [`PipelineError`], carried out of every layer.

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

// Re-export the most commonly used types at the crate root
pub use entities::{CommandContext, CommandMetadata, ContextKey, ContextSnapshot};
pub use error::{AuthorizationReason, BackPressureError, EncryptionError, PipelineError, ValidationReason};
pub use services::{
    Cache, CacheExt, ChainInvoker, Command, CommandHandler, GuardDiagnosticsSink, GuardState, JournalEntry,
    JournalState, JournalStorage, MetricSnapshot, MetricType, MetricsRecorder, Middleware, Next, NextGuard,
};
pub use value_objects::{CommandId, ExecutionPriority, RegistryKey};

// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command and Handler Contracts
//!
//! This module defines the two foundational contracts of the dispatch
//! domain: the [`Command`] marker describing a typed unit of work and its
//! typed result, and the [`CommandHandler`] terminal processor bound to
//! exactly one command type.
//!
//! ## Overview
//!
//! A command is a user-defined immutable value. Its associated `Output` type
//! is what a successful dispatch produces. Commands pass through the
//! middleware chain by value and must be safe to share between concurrent
//! tasks (`Send + Sync`).
//!
//! Handlers terminate the chain: after the last middleware calls `next`, the
//! pipeline invokes the handler exactly once with the (possibly transformed)
//! command.
//!
//! ## Dispatch Model
//!
//! Pipelines are monomorphized per command type: a `Pipeline<C>` holds
//! `dyn CommandHandler<C>` and `dyn Middleware<C>` trade objects, so the
//! whole chain is statically typed end to end. Type erasure happens only at
//! the registry boundary, where pipelines are looked up by the command's
//! `TypeId`.
//!
//! ## Usage Example
//!
//! ```
//! use async_trait::async_trait;
//! use pipeline_kit_domain::services::{Command, CommandHandler};
//! use pipeline_kit_domain::PipelineError;
//!
//! struct Add {
//!     a: i64,
//!     b: i64,
//! }
//!
//! impl Command for Add {
//!     type Output = i64;
//! }
//!
//! struct AddHandler;
//!
//! #[async_trait]
//! impl CommandHandler<Add> for AddHandler {
//!     async fn handle(&self, command: Add) -> Result<i64, PipelineError> {
//!         Ok(command.a + command.b)
//!     }
//! }
//! ```

use crate::error::PipelineError;
use async_trait::async_trait;

/// Typed input value describing an action to perform.
///
/// The associated `Output` is the result type a successful dispatch
/// produces. Commands live for one invocation; the runtime never retains
/// them beyond the chain (the batching processor re-dispatches clones when a
/// retry policy requires it, which is why some call sites add a `Clone`
/// bound).
pub trait Command: Send + Sync + 'static {
    /// Result type produced by this command's handler
    type Output: Send + Sync + 'static;

    /// Stable name for diagnostics, registry errors, and metric tags
    fn command_type() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

/// Terminal processor for one command type.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a pipeline may execute on any
/// worker of the runtime and many executions may run concurrently.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    /// Processes the command, producing its typed result
    async fn handle(&self, command: C) -> Result<C::Output, PipelineError>;
}

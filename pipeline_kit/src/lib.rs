// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PipelineKit
//!
//! An embeddable command-dispatch runtime: callers submit typed commands,
//! which are routed through an ordered chain of middleware to a terminal
//! handler that produces the command's typed result. The crate provides the
//! execution substrate that makes dispatch correct and fast under
//! concurrency.
//!
//! ## Architecture
//!
//! The workspace follows a domain / implementation split:
//!
//! - `pipeline-kit-domain` holds the contracts: [`Command`], [`CommandHandler`],
//!   [`Middleware`] with its exactly-once [`Next`] guard, the
//!   [`CommandContext`] typed state carrier, and the [`PipelineError`]
//!   taxonomy
//! - this crate implements the runtime: chain compilation and execution,
//!   back-pressure admission, batching, rate limiting, circuit breaking,
//!   retries, registries, pools, and caches
//!
//! ## Quick Start
//!
//! ```
//! use async_trait::async_trait;
//! use pipeline_kit::{CommandContext, PipelineBuilder};
//! use pipeline_kit_domain::services::{Command, CommandHandler};
//! use pipeline_kit_domain::PipelineError;
//!
//! struct Add { a: i64, b: i64 }
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
//!
//! # async fn run() -> Result<(), PipelineError> {
//! let pipeline = PipelineBuilder::new(AddHandler).build();
//! let mut context = CommandContext::default();
//! let sum = pipeline.execute(Add { a: 5, b: 3 }, &mut context).await?;
//! assert_eq!(sum, 8);
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`application`]: pipeline service and batch processor
//! - [`infrastructure`]: runtime substrate, throttling and resilience
//!   services, registries, metrics, logging bridge

pub mod application;
pub mod infrastructure;

// Re-export the assembled public API at the crate root
pub use application::services::{
    BatchConfig, BatchContext, BatchContextKey, BatchProcessor, PartialBatchStrategy, Pipeline, PipelineBuilder,
    PipelineOptions,
};
pub use infrastructure::metrics::{InMemoryMetricsRecorder, PrometheusMetricsService};
pub use infrastructure::repositories::{InMemoryJournalStorage, PipelineRegistry, RegistryStats};
pub use infrastructure::runtime::{
    BackPressureConfig, BackPressurePermit, BackPressureSemaphore, BackPressureStrategy, MemoryPressureHandler,
    MemoryPressureLevel, Pool, PoolStats, SemaphoreHealth, SemaphoreStats,
};
pub use infrastructure::services::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMiddleware, CircuitBreakerRegistry,
    CircuitState, PooledCache, RateLimitDecision, RateLimitScope, RateLimitStrategy, RateLimiter,
    RateLimitingMiddleware, RetryPolicy,
};

// Domain types surface through this crate for one-import ergonomics
pub use pipeline_kit_domain::{
    BackPressureError, Cache, CacheExt, Command, CommandContext, CommandHandler, CommandId, CommandMetadata,
    ContextKey, ExecutionPriority, GuardState, JournalEntry, JournalState, JournalStorage, MetricSnapshot,
    MetricType, MetricsRecorder, Middleware, Next, NextGuard, PipelineError, RegistryKey,
};

// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Services Module
//!
//! Contracts and ports of the dispatch domain:
//!
//! - [`Command`] / [`CommandHandler`]: the typed unit of work and its
//!   terminal processor
//! - [`Middleware`] / [`Next`] / [`NextGuard`]: the ordered wrapper contract
//!   with its exactly-once continuation guard
//! - [`Cache`], [`MetricsRecorder`], [`JournalStorage`]: collaborator ports
//!   implemented by replaceable plug-ins
//! - [`datetime_serde`]: RFC3339 serialization helper shared by timestamped
//!   types

pub mod cache_service;
pub mod command_handler;
pub mod datetime_serde;
pub mod journal_service;
pub mod metrics_service;
pub mod middleware;

pub use cache_service::{Cache, CacheExt};
pub use command_handler::{Command, CommandHandler};
pub use journal_service::{JournalEntry, JournalState, JournalStorage};
pub use metrics_service::{MetricSnapshot, MetricType, MetricsRecorder};
pub use middleware::{
    guard_diagnostics_enabled, set_guard_diagnostics_enabled, set_guard_diagnostics_sink, ChainInvoker,
    GuardDiagnosticsSink, GuardState, Middleware, Next, NextGuard,
};

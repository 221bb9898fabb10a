// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Concrete implementations behind the domain contracts: the chain
//! executor and concurrency substrate ([`runtime`]), throttling and
//! resilience services ([`services`]), registries and storage adapters
//! ([`repositories`]), metric exporters ([`metrics`]), and the `tracing`
//! bridge ([`logging`]).

pub mod logging;
pub mod metrics;
pub mod repositories;
pub mod runtime;
pub mod services;

// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runtime Module
//!
//! Concurrency substrate of the dispatch core:
//!
//! - [`chain`]: chain compiler and executor with guard wiring
//! - [`back_pressure`]: admission-control semaphore with overflow
//!   strategies
//! - [`object_pool`]: bounded reusable-object pool with scoped borrowing
//! - [`memory_pressure`]: pressure fan-out shrinking registered pools

pub mod back_pressure;
pub mod chain;
pub mod memory_pressure;
pub mod object_pool;

pub use back_pressure::{
    BackPressureConfig, BackPressurePermit, BackPressureSemaphore, BackPressureStrategy, SemaphoreHealth,
    SemaphoreStats,
};
pub use chain::CompiledChain;
pub use memory_pressure::{MemoryPressureHandler, MemoryPressureLevel};
pub use object_pool::{Pool, PoolStats};

// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Objects Module
//!
//! Immutable value objects for the dispatch domain. Value objects are
//! defined by their attributes, self-validating, and side-effect free:
//!
//! - [`CommandId`]: ULID-backed identifier for one command invocation
//! - [`ExecutionPriority`]: ordered middleware phase enumeration
//! - [`RegistryKey`]: composite (command type, name) registration key

pub mod command_id;
pub mod execution_priority;
pub mod registry_key;

pub use command_id::CommandId;
pub use execution_priority::ExecutionPriority;
pub use registry_key::RegistryKey;

// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command ID Value Object
//!
//! This module provides a type-safe command invocation identifier for the
//! dispatch runtime. Every command submitted to a pipeline is stamped with a
//! `CommandId` so its journey through middleware, batching, and journaling
//! can be correlated in logs and metrics.
//!
//! ## Overview
//!
//! The command ID system provides:
//!
//! - **Type-Safe Identification**: Cannot be confused with other identifier
//!   types in function signatures
//! - **Time-Ordered Generation**: ULID-based identifiers sort by creation
//!   time, which keeps journals and audit trails naturally ordered
//! - **Serialization**: Stable string representation across storage backends
//!   and APIs
//!
//! ## Key Features
//!
//! ### 1. ULID Foundation
//!
//! Command IDs are backed by ULIDs (Universally Unique Lexicographically
//! Sortable Identifiers):
//!
//! - **Sortable**: Lexicographic order matches creation order
//! - **Compact**: 26-character Crockford base32 representation
//! - **Collision-Resistant**: 80 bits of randomness per millisecond
//!
//! ### 2. Cross-Platform Compatibility
//!
//! - **JSON**: Serializes as the canonical 26-character string
//! - **Display**: Human-readable form for logs and diagnostics

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use ulid::Ulid;

/// Type-safe identifier for a single command invocation.
///
/// `CommandId` is an immutable value object. Two IDs are equal when their
/// underlying ULIDs are equal; ordering follows ULID lexicographic order,
/// which is creation-time order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Ulid);

impl CommandId {
    /// Generates a new command ID from the current time and randomness
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Wraps an existing ULID
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the millisecond timestamp encoded in the identifier
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for CommandId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl From<CommandId> for Ulid {
    fn from(id: CommandId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids_are_unique() {
        let a = CommandId::new();
        let b = CommandId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_command_ids_sort_by_creation_time() {
        let earlier = CommandId::from_ulid(Ulid::from_parts(1_000, 42));
        let later = CommandId::from_ulid(Ulid::from_parts(2_000, 42));
        assert!(earlier < later);
    }

    #[test]
    fn test_display_round_trip() {
        let id = CommandId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 26);

        let parsed: Ulid = text.parse().unwrap();
        assert_eq!(CommandId::from_ulid(parsed), id);
    }

    #[test]
    fn test_serde_round_trip() {
        let id = CommandId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: CommandId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

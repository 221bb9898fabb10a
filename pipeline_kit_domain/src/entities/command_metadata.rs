// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Metadata
//!
//! Per-invocation metadata carried inside every [`CommandContext`]. The
//! metadata identifies one dispatch: a unique command ID, optional
//! correlation and user attribution, and the creation timestamp.
//!
//! ## Overview
//!
//! Metadata travels with the command through every middleware and into the
//! handler's observability surface:
//!
//! - **Identification**: `command_id` uniquely names this invocation
//! - **Correlation**: `correlation_id` links invocations belonging to one
//!   logical operation (a batch, a saga, an inbound request)
//! - **Attribution**: `user_id` feeds authorization and per-user rate
//!   limiting scopes
//! - **Timing**: `timestamp` records when the invocation was created
//!
//! Metadata is immutable once attached to a context; forks inherit a copy.
//!
//! [`CommandContext`]: crate::entities::CommandContext

use crate::services::datetime_serde;
use crate::value_objects::CommandId;
use serde::{Deserialize, Serialize};

/// Immutable metadata describing one command invocation.
///
/// Constructed once per dispatch and carried by the invocation's context.
/// Builder-style `with_*` methods configure the optional fields.
///
/// # Examples
///
/// ```
/// use pipeline_kit_domain::entities::CommandMetadata;
///
/// let metadata = CommandMetadata::new()
///     .with_correlation_id("req-8812")
///     .with_user_id("user-42");
///
/// assert_eq!(metadata.user_id(), Some("user-42"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMetadata {
    // Identity fields (always first)
    command_id: CommandId,

    // Core business fields (alphabetical within group)
    correlation_id: Option<String>,
    user_id: Option<String>,

    // Metadata fields (always last)
    #[serde(with = "datetime_serde")]
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl CommandMetadata {
    /// Creates metadata for a new invocation with a fresh command ID
    pub fn new() -> Self {
        Self {
            command_id: CommandId::new(),
            correlation_id: None,
            user_id: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Sets the correlation identifier
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the user attribution
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns the unique command invocation ID
    pub fn command_id(&self) -> CommandId {
        self.command_id
    }

    /// Returns the correlation ID, if any
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the user attribution, if any
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the invocation creation timestamp
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.timestamp
    }
}

impl Default for CommandMetadata {
    fn default() -> Self {
        Self::new()
    }
}

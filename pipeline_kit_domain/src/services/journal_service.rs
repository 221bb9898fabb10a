// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Journal Storage Interface
//!
//! Persistence port for the optional journaling middleware. The core defines
//! only the contract: entries are written before a command executes, updated
//! as it progresses, and completed entries are pruned. Storage formats and
//! I/O belong to the implementing middleware, out of the core's scope.

use crate::error::PipelineError;
use crate::services::datetime_serde;
use crate::value_objects::CommandId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Progress state of a journaled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One journaled command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    // Identity fields (always first)
    pub id: CommandId,

    // Core business fields
    pub command_type: String,
    pub payload: serde_json::Value,
    pub state: JournalState,

    // Metadata fields (always last)
    #[serde(with = "datetime_serde")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "datetime_serde")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl JournalEntry {
    /// Creates a pending entry for a command about to execute
    pub fn new(id: CommandId, command_type: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            command_type: command_type.into(),
            payload,
            state: JournalState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the entry to a new state, refreshing the update timestamp
    pub fn with_state(mut self, state: JournalState) -> Self {
        self.state = state;
        self.updated_at = chrono::Utc::now();
        self
    }

    /// Returns true once the entry reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JournalState::Completed | JournalState::Failed)
    }
}

/// Journal persistence port consumed by journaling middleware.
#[async_trait]
pub trait JournalStorage: Send + Sync {
    /// Persists a new entry
    async fn write(&self, entry: JournalEntry) -> Result<(), PipelineError>;

    /// Replaces the stored entry with the same ID
    async fn update(&self, entry: JournalEntry) -> Result<(), PipelineError>;

    /// Reads every entry that has not reached a terminal state
    async fn read_incomplete(&self) -> Result<Vec<JournalEntry>, PipelineError>;

    /// Deletes completed entries last updated before `before`
    async fn delete_completed(&self, before: chrono::DateTime<chrono::Utc>) -> Result<u64, PipelineError>;
}

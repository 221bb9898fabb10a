// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Journal Storage
//!
//! Reference implementation of the [`JournalStorage`] port. Durable
//! backends belong to the journaling middleware that owns them; this
//! adapter exists for tests and for embedders that only need
//! process-lifetime journaling.

use pipeline_kit_domain::error::PipelineError;
use pipeline_kit_domain::services::{JournalEntry, JournalStorage};
use pipeline_kit_domain::value_objects::CommandId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Journal storage backed by a process-local map.
#[derive(Default)]
pub struct InMemoryJournalStorage {
    entries: Mutex<HashMap<CommandId, JournalEntry>>,
}

impl InMemoryJournalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true when the journal holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl JournalStorage for InMemoryJournalStorage {
    async fn write(&self, entry: JournalEntry) -> Result<(), PipelineError> {
        self.entries.lock().insert(entry.id, entry);
        Ok(())
    }

    async fn update(&self, entry: JournalEntry) -> Result<(), PipelineError> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(&entry.id) {
            return Err(PipelineError::internal(format!(
                "journal entry {} does not exist",
                entry.id
            )));
        }
        entries.insert(entry.id, entry);
        Ok(())
    }

    async fn read_incomplete(&self) -> Result<Vec<JournalEntry>, PipelineError> {
        let entries = self.entries.lock();
        let mut incomplete: Vec<JournalEntry> = entries
            .values()
            .filter(|entry| !entry.is_terminal())
            .cloned()
            .collect();
        incomplete.sort_by_key(|entry| entry.created_at);
        Ok(incomplete)
    }

    async fn delete_completed(&self, before: chrono::DateTime<chrono::Utc>) -> Result<u64, PipelineError> {
        let mut entries = self.entries.lock();
        let before_len = entries.len();
        entries.retain(|_, entry| !(entry.is_terminal() && entry.updated_at < before));
        Ok((before_len - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_kit_domain::services::JournalState;

    fn entry(state: JournalState) -> JournalEntry {
        JournalEntry::new(CommandId::new(), "Add", serde_json::json!({"a": 1})).with_state(state)
    }

    #[tokio::test]
    async fn test_write_and_read_incomplete() {
        let journal = InMemoryJournalStorage::new();
        journal.write(entry(JournalState::Pending)).await.unwrap();
        journal.write(entry(JournalState::InProgress)).await.unwrap();
        journal.write(entry(JournalState::Completed)).await.unwrap();

        let incomplete = journal.read_incomplete().await.unwrap();
        assert_eq!(incomplete.len(), 2);
        assert!(incomplete.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_update_requires_existing_entry() {
        let journal = InMemoryJournalStorage::new();
        let stored = entry(JournalState::Pending);
        journal.write(stored.clone()).await.unwrap();

        let updated = stored.with_state(JournalState::Completed);
        journal.update(updated).await.unwrap();
        assert!(journal.read_incomplete().await.unwrap().is_empty());

        let unknown = entry(JournalState::Pending);
        assert!(journal.update(unknown).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_completed_before_cutoff() {
        let journal = InMemoryJournalStorage::new();
        journal.write(entry(JournalState::Completed)).await.unwrap();
        journal.write(entry(JournalState::Failed)).await.unwrap();
        journal.write(entry(JournalState::Pending)).await.unwrap();

        let removed = journal
            .delete_completed(chrono::Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(journal.len(), 1);
    }
}

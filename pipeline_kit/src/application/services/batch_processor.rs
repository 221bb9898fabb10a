// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Processor
//!
//! This module coalesces individually submitted commands into batches and
//! fans the results back to the per-caller futures, amortizing pipeline
//! overhead for high-frequency command streams.
//!
//! ## Algorithm
//!
//! 1. `submit` appends an entry `(command, context, resolver)` to the
//!    pending list. Reaching `max_batch_size` flushes synchronously
//!    relative to the submitting caller.
//! 2. Below the size threshold, the partial-batch strategy decides:
//!    - **WaitForFull**: nothing happens until the batch fills (or an
//!      explicit [`BatchProcessor::flush`])
//!    - **ProcessImmediately**: a flush task is scheduled right away and
//!      takes whatever is pending when it runs
//!    - **ProcessAfterTimeout**: a single timer is armed; at most one timer
//!      exists at any moment
//! 3. `flush` atomically detaches the pending entries, assigns the next
//!    monotonically increasing batch ID, and injects a
//!    [`BatchContext`] `{ batch_id, size }` into every entry's context
//!    under [`BatchContextKey`].
//! 4. Dispatch respects `preserve_order`: sequential execution resolving
//!    each caller as its entry completes, or concurrent execution under the
//!    pipeline's normal admission control.
//!
//! ## Resolution Guarantees
//!
//! Every submitted command's future resolves **exactly once**: with the
//! handler's result, with that entry's own error (other entries proceed),
//! or with `Cancelled` at shutdown. A command is never both pending and
//! flushing; detachment happens under the pending lock.

use crate::application::services::pipeline_service::Pipeline;
use pipeline_kit_domain::entities::{CommandContext, ContextKey};
use pipeline_kit_domain::error::PipelineError;
use pipeline_kit_domain::services::Command;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Strategy for batches that have not reached `max_batch_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialBatchStrategy {
    /// Hold entries until the batch fills
    WaitForFull,
    /// Flush pending entries as soon as the scheduler allows
    ProcessImmediately,
    /// Flush whatever is pending once `max_batch_wait` elapses
    ProcessAfterTimeout,
}

/// Batch processor configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Flush threshold; `1` makes the processor a pass-through
    pub max_batch_size: usize,

    /// Timer used by [`PartialBatchStrategy::ProcessAfterTimeout`]
    pub max_batch_wait: Duration,

    /// Execute entries sequentially in submission order
    pub preserve_order: bool,

    /// Flush policy for batches below the size threshold
    pub partial_strategy: PartialBatchStrategy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 16,
            max_batch_wait: Duration::from_millis(50),
            preserve_order: false,
            partial_strategy: PartialBatchStrategy::ProcessAfterTimeout,
        }
    }
}

/// Batch identity injected into every member's context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchContext {
    /// Monotonically increasing per-processor batch number
    pub batch_id: u64,
    /// Number of entries flushed together
    pub size: usize,
}

/// Context key under which [`BatchContext`] is stored.
pub struct BatchContextKey;

impl ContextKey for BatchContextKey {
    type Value = BatchContext;

    fn name() -> &'static str {
        "batch_context"
    }
}

struct BatchEntry<C: Command> {
    command: C,
    context: CommandContext,
    resolver: oneshot::Sender<Result<C::Output, PipelineError>>,
}

struct PendingState<C: Command> {
    entries: Vec<BatchEntry<C>>,
    /// True while a timer or immediate-flush task is scheduled.
    flush_scheduled: bool,
    /// Bumped on every detach so stale scheduled flushes no-op.
    generation: u64,
}

struct BatchShared<C: Command> {
    pipeline: Pipeline<C>,
    config: BatchConfig,
    pending: Mutex<PendingState<C>>,
    batch_seq: AtomicU64,
    shutdown: AtomicBool,
}

/// Coalesces commands into batches dispatched through one pipeline.
///
/// Cheap to clone; clones share the pending state and the batch sequence.
pub struct BatchProcessor<C: Command> {
    shared: Arc<BatchShared<C>>,
}

impl<C: Command> Clone for BatchProcessor<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Command> BatchProcessor<C> {
    /// Creates a processor dispatching batches through `pipeline`
    pub fn new(pipeline: Pipeline<C>, config: BatchConfig) -> Self {
        Self {
            shared: Arc::new(BatchShared {
                pipeline,
                config,
                pending: Mutex::new(PendingState {
                    entries: Vec::new(),
                    flush_scheduled: false,
                    generation: 0,
                }),
                batch_seq: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Submits a command with a fresh context
    pub async fn submit(&self, command: C) -> Result<C::Output, PipelineError> {
        self.submit_with_context(command, CommandContext::default()).await
    }

    /// Submits a command with a caller-provided context
    ///
    /// Returns once this entry's batch executed it; the future resolves
    /// exactly once.
    pub async fn submit_with_context(
        &self,
        command: C,
        context: CommandContext,
    ) -> Result<C::Output, PipelineError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(PipelineError::Cancelled);
        }

        let (resolver, receiver) = oneshot::channel();
        let to_flush = {
            let mut pending = self.shared.pending.lock();
            pending.entries.push(BatchEntry {
                command,
                context,
                resolver,
            });

            if pending.entries.len() >= self.shared.config.max_batch_size {
                Some(Self::detach(&mut pending))
            } else {
                match self.shared.config.partial_strategy {
                    PartialBatchStrategy::WaitForFull => {}
                    PartialBatchStrategy::ProcessImmediately => {
                        if !pending.flush_scheduled {
                            pending.flush_scheduled = true;
                            let processor = self.clone();
                            let generation = pending.generation;
                            tokio::spawn(async move {
                                processor.flush_generation(generation).await;
                            });
                        }
                    }
                    PartialBatchStrategy::ProcessAfterTimeout => {
                        if !pending.flush_scheduled {
                            pending.flush_scheduled = true;
                            let processor = self.clone();
                            let generation = pending.generation;
                            let wait = self.shared.config.max_batch_wait;
                            tokio::spawn(async move {
                                tokio::time::sleep(wait).await;
                                processor.flush_generation(generation).await;
                            });
                        }
                    }
                }
                None
            }
        };

        if let Some(entries) = to_flush {
            // Size-triggered flush runs synchronously relative to this
            // caller; its own entry resolves through the channel below.
            self.flush_entries(entries).await;
        }

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Cancelled),
        }
    }

    /// Flushes whatever is currently pending
    pub async fn flush(&self) {
        let entries = {
            let mut pending = self.shared.pending.lock();
            Self::detach(&mut pending)
        };
        if !entries.is_empty() {
            self.flush_entries(entries).await;
        }
    }

    /// Number of entries waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().entries.len()
    }

    /// Fails every pending entry with `Cancelled` and refuses new submits
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let entries = {
            let mut pending = self.shared.pending.lock();
            Self::detach(&mut pending)
        };
        debug!(cancelled = entries.len(), "batch processor shut down");
        for entry in entries {
            let _ = entry.resolver.send(Err(PipelineError::Cancelled));
        }
    }

    fn detach(pending: &mut PendingState<C>) -> Vec<BatchEntry<C>> {
        pending.generation += 1;
        pending.flush_scheduled = false;
        std::mem::take(&mut pending.entries)
    }

    /// Flush path for scheduled tasks; a stale generation means the batch
    /// was already taken by a size trigger or an explicit flush.
    async fn flush_generation(&self, generation: u64) {
        let entries = {
            let mut pending = self.shared.pending.lock();
            if pending.generation != generation || pending.entries.is_empty() {
                return;
            }
            Self::detach(&mut pending)
        };
        self.flush_entries(entries).await;
    }

    async fn flush_entries(&self, entries: Vec<BatchEntry<C>>) {
        let batch_id = self.shared.batch_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let batch_context = BatchContext {
            batch_id,
            size: entries.len(),
        };
        debug!(batch_id, size = batch_context.size, "flushing batch");

        if self.shared.config.preserve_order {
            for entry in entries {
                entry.context.set::<BatchContextKey>(batch_context.clone());
                let mut context = entry.context;
                let result = self.shared.pipeline.execute(entry.command, &mut context).await;
                let _ = entry.resolver.send(result);
            }
        } else {
            let executions = entries.into_iter().map(|entry| {
                let pipeline = self.shared.pipeline.clone();
                let batch_context = batch_context.clone();
                async move {
                    entry.context.set::<BatchContextKey>(batch_context);
                    let mut context = entry.context;
                    let result = pipeline.execute(entry.command, &mut context).await;
                    let _ = entry.resolver.send(result);
                }
            });
            futures::future::join_all(executions).await;
        }
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Admission and Batching Integration Tests
//!
//! End-to-end scenarios for back-pressure admission and the batch
//! processor: concurrent submits against a concurrency limit, batch
//! coalescing by size with per-caller resolution, and the semaphore
//! accounting identity under concurrent load.

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_kit::{
    BackPressureError, BackPressureSemaphore, BackPressureStrategy, BatchConfig, BatchContextKey, BatchProcessor,
    Command, CommandContext, CommandHandler, Middleware, Next, PartialBatchStrategy, PipelineBuilder,
    PipelineError, PipelineOptions,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct Work(&'static str);

impl Command for Work {
    type Output = String;
}

struct SlowOkHandler;

#[async_trait]
impl CommandHandler<Work> for SlowOkHandler {
    async fn handle(&self, command: Work) -> Result<String, PipelineError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(command.0.to_string())
    }
}

/// Limit 1 with the error strategy: the first submit wins, the concurrent
/// second submit is rejected promptly.
#[tokio::test]
async fn test_back_pressure_error_strategy_rejects_second_caller() {
    let pipeline = Arc::new(
        PipelineBuilder::new(SlowOkHandler)
            .with_options(PipelineOptions {
                max_concurrency: Some(1),
                back_pressure_strategy: BackPressureStrategy::Error,
                ..Default::default()
            })
            .build(),
    );

    let winner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let mut context = CommandContext::default();
            pipeline.execute(Work("ok"), &mut context).await
        })
    };
    // Let the first execution take the only permit.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = std::time::Instant::now();
    let mut context = CommandContext::default();
    let err = pipeline.execute(Work("late"), &mut context).await.unwrap_err();
    assert_eq!(err, PipelineError::BackPressure(BackPressureError::Rejected));
    assert!(
        started.elapsed() < Duration::from_millis(50),
        "rejection must be prompt, not queued behind the winner"
    );

    assert_eq!(winner.await.unwrap(), Ok("ok".to_string()));
}

/// Three concurrent submits with `max_batch_size = 3` coalesce into one
/// batch of size 3; every caller receives its own result.
#[tokio::test]
async fn test_batching_by_size() {
    #[derive(Clone)]
    struct Echo(u32);

    impl Command for Echo {
        type Output = u32;
    }

    struct EchoHandler;

    #[async_trait]
    impl CommandHandler<Echo> for EchoHandler {
        async fn handle(&self, command: Echo) -> Result<u32, PipelineError> {
            Ok(command.0)
        }
    }

    /// Records the batch size each entry observed in its context.
    struct BatchObserver {
        sizes: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl Middleware<Echo> for BatchObserver {
        async fn execute(
            &self,
            command: Echo,
            context: &mut CommandContext,
            next: Next<Echo>,
        ) -> Result<u32, PipelineError> {
            if let Some(batch) = context.get::<BatchContextKey>() {
                self.sizes.lock().push(batch.size);
            }
            next.run(command, context).await
        }
    }

    let sizes = Arc::new(Mutex::new(Vec::new()));
    let pipeline = PipelineBuilder::new(EchoHandler)
        .with_middleware(BatchObserver {
            sizes: Arc::clone(&sizes),
        })
        .build();
    let processor = BatchProcessor::new(
        pipeline,
        BatchConfig {
            max_batch_size: 3,
            partial_strategy: PartialBatchStrategy::ProcessImmediately,
            ..Default::default()
        },
    );

    let (a, b, c) = futures::join!(processor.submit(Echo(1)), processor.submit(Echo(2)), processor.submit(Echo(3)));
    assert_eq!(a, Ok(1));
    assert_eq!(b, Ok(2));
    assert_eq!(c, Ok(3));

    let sizes = sizes.lock();
    assert_eq!(sizes.len(), 3);
    assert!(sizes.iter().all(|&size| size == 3), "batch context must report size 3");
}

/// The semaphore accounting identity holds after concurrent churn: every
/// grant is matched by a release, and rejected callers never hold a slot.
#[tokio::test]
async fn test_semaphore_accounting_identity_under_load() {
    let sem = BackPressureSemaphore::with_limit(4);

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let sem = sem.clone();
        tasks.push(tokio::spawn(async move {
            match sem.acquire_timeout(Duration::from_millis(500)).await {
                Ok(permit) => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    permit.release();
                    true
                }
                Err(_) => false,
            }
        }));
    }

    let mut granted = 0u64;
    for task in tasks {
        if task.await.unwrap() {
            granted += 1;
        }
    }

    let stats = sem.stats();
    assert_eq!(stats.outstanding, 0, "all permits returned");
    assert_eq!(stats.queued, 0, "no waiter leaked");
    assert_eq!(stats.total_acquired, granted);
    assert_eq!(granted + stats.total_timed_out, 32);
}

/// The execution timeout covers admission wait plus handler time; the
/// loser of a timeout race is cleaned up and its permit freed.
#[tokio::test(start_paused = true)]
async fn test_admission_timeout_cleanup() {
    // Handler takes 100ms; the bound is 150ms. The winner fits. A second
    // caller spends ~80ms queued plus 100ms executing and times out.
    let pipeline = Arc::new(
        PipelineBuilder::new(SlowOkHandler)
            .with_options(PipelineOptions {
                max_concurrency: Some(1),
                back_pressure_strategy: BackPressureStrategy::Suspend,
                timeout: Some(Duration::from_millis(150)),
                ..Default::default()
            })
            .build(),
    );

    let winner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let mut context = CommandContext::default();
            pipeline.execute(Work("ok"), &mut context).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut context = CommandContext::default();
    let err = pipeline.execute(Work("late"), &mut context).await.unwrap_err();
    assert!(matches!(err, PipelineError::Timeout { .. }));

    assert_eq!(winner.await.unwrap(), Ok("ok".to_string()));

    // The timed-out execution released its permit on the way out; the
    // pipeline is immediately usable again.
    let mut context = CommandContext::default();
    let result = pipeline.execute(Work("again"), &mut context).await;
    assert_eq!(result, Ok("again".to_string()));
}

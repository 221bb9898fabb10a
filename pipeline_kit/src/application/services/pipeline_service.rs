// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Service
//!
//! This module provides the application-layer orchestration of one dispatch:
//! the immutable [`Pipeline`] artifact, its [`PipelineBuilder`], and the
//! execution contract that applies admission control, timeout, retry, and
//! metrics around the compiled chain.
//!
//! ## Execution Contract
//!
//! Every [`Pipeline::execute`] call proceeds through the same stages:
//!
//! 1. **Admission** - when the pipeline was built with `max_concurrency`,
//!    a permit is acquired from the back-pressure semaphore. Admission
//!    failures surface as the `BackPressure` error variants.
//! 2. **Chain invocation** - the compiled middleware chain runs in priority
//!    order, ending at the handler.
//! 3. **Release** - the permit is released exactly once on every path:
//!    success, error, timeout, and caller cancellation (RAII).
//!
//! `PipelineOptions::timeout` bounds the *whole* execution - admission wait
//! included - and surfaces as `Timeout { elapsed }`. Cancellation of the
//! caller's task propagates into the chain at the next suspension point and
//! never leaves a guard wedged or a permit held.
//!
//! ## Retry
//!
//! [`Pipeline::execute_with_retry`] re-dispatches transient failures under
//! `PipelineOptions::retry_policy`. Re-dispatch needs a fresh copy of the
//! command, hence the `Command + Clone` bound on that method only; plain
//! `execute` carries no `Clone` requirement.
//!
//! ## Observability
//!
//! A pipeline built with a [`MetricsRecorder`] emits one counter and one
//! timer snapshot per execution, tagged with the outcome category.

use crate::infrastructure::runtime::back_pressure::{
    BackPressureConfig, BackPressureSemaphore, BackPressureStrategy,
};
use crate::infrastructure::runtime::chain::CompiledChain;
use crate::infrastructure::services::retry::RetryPolicy;
use pipeline_kit_domain::entities::CommandContext;
use pipeline_kit_domain::error::PipelineError;
use pipeline_kit_domain::services::{Command, CommandHandler, MetricSnapshot, MetricsRecorder, Middleware};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Tuning options applied by the pipeline executor.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Maximum concurrently executing commands; `None` disables admission
    /// control entirely
    pub max_concurrency: Option<usize>,

    /// Maximum queued waiters behind the concurrency limit
    pub max_outstanding: Option<usize>,

    /// Overflow policy applied at the concurrency limit
    pub back_pressure_strategy: BackPressureStrategy,

    /// Wall-clock bound on the whole execution, admission included
    pub timeout: Option<Duration>,

    /// Policy consulted by [`Pipeline::execute_with_retry`]
    pub retry_policy: Option<RetryPolicy>,
}

/// Immutable compiled pipeline: ordered middleware, handler, and options.
///
/// Built once through [`PipelineBuilder`], executed many times; cloning
/// shares the compiled chain and the admission semaphore.
pub struct Pipeline<C: Command> {
    chain: CompiledChain<C>,
    semaphore: Option<BackPressureSemaphore>,
    options: PipelineOptions,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl<C: Command> Clone for Pipeline<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            semaphore: self.semaphore.clone(),
            options: self.options.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<C: Command> Pipeline<C> {
    /// Executes the pipeline for one command
    ///
    /// See the module documentation for the full execution contract.
    pub async fn execute(&self, command: C, context: &mut CommandContext) -> Result<C::Output, PipelineError> {
        let started = tokio::time::Instant::now();
        let result = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.execute_admitted(command, context)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::timeout(started.elapsed())),
            },
            None => self.execute_admitted(command, context).await,
        };
        self.record_outcome(&result, started.elapsed()).await;
        result
    }

    async fn execute_admitted(&self, command: C, context: &mut CommandContext) -> Result<C::Output, PipelineError> {
        // Held across the chain invocation; released on every exit path by
        // the permit's RAII drop.
        let _permit = match &self.semaphore {
            Some(semaphore) => Some(semaphore.acquire().await?),
            None => None,
        };
        self.chain.execute(command, context).await
    }

    /// Returns the number of middleware in the compiled chain
    pub fn middleware_count(&self) -> usize {
        self.chain.middleware_count()
    }

    /// Returns the executor options
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Returns the admission semaphore, when one was configured
    pub fn semaphore(&self) -> Option<&BackPressureSemaphore> {
        self.semaphore.as_ref()
    }

    async fn record_outcome(&self, result: &Result<C::Output, PipelineError>, elapsed: Duration) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let outcome = match result {
            Ok(_) => "ok",
            Err(err) => err.category(),
        };
        metrics
            .record(
                MetricSnapshot::counter("pipeline_commands_total", 1.0)
                    .with_tag("command", C::command_type())
                    .with_tag("outcome", outcome),
            )
            .await;
        metrics
            .record(
                MetricSnapshot::timer("pipeline_execution_seconds", elapsed.as_secs_f64())
                    .with_tag("command", C::command_type()),
            )
            .await;
    }
}

impl<C: Command + Clone> Pipeline<C> {
    /// Executes under the configured retry policy
    ///
    /// Transient failures (as classified by the error taxonomy) are
    /// re-dispatched with a fresh clone of the command, up to the policy's
    /// attempt budget. Without a configured policy this is plain
    /// [`execute`](Self::execute). Cancellation aborts in-progress backoff
    /// sleeps.
    pub async fn execute_with_retry(&self, command: C, context: &mut CommandContext) -> Result<C::Output, PipelineError> {
        let Some(policy) = self.options.retry_policy.clone() else {
            return self.execute(command, context).await;
        };
        let mut attempt = 1;
        loop {
            match self.execute(command.clone(), context).await {
                Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    debug!(attempt, ?delay, error = %err, "retrying command after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Builder assembling a [`Pipeline`] from a handler, middleware, and
/// options.
///
/// Middleware order within one priority phase is the order of
/// `with_middleware` calls.
pub struct PipelineBuilder<C: Command> {
    middleware: Vec<Arc<dyn Middleware<C>>>,
    handler: Arc<dyn CommandHandler<C>>,
    options: PipelineOptions,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl<C: Command> PipelineBuilder<C> {
    /// Starts a builder around the terminal handler
    pub fn new(handler: impl CommandHandler<C> + 'static) -> Self {
        Self {
            middleware: Vec::new(),
            handler: Arc::new(handler),
            options: PipelineOptions::default(),
            metrics: None,
        }
    }

    /// Adds a middleware
    pub fn with_middleware(mut self, middleware: impl Middleware<C> + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Adds an already-shared middleware handle
    pub fn with_middleware_arc(mut self, middleware: Arc<dyn Middleware<C>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Sets the executor options
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Attaches a metrics recorder
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Compiles the chain and produces the immutable pipeline
    pub fn build(self) -> Pipeline<C> {
        let semaphore = self.options.max_concurrency.map(|limit| {
            BackPressureSemaphore::new(BackPressureConfig {
                limit,
                strategy: self.options.back_pressure_strategy,
                max_queue_depth: self.options.max_outstanding,
            })
        });
        Pipeline {
            chain: CompiledChain::compile(self.middleware, self.handler),
            semaphore,
            options: self.options,
            metrics: self.metrics,
        }
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retry Policy
//!
//! Bounded retry with configurable backoff for transient failures. The
//! policy is a value object consumed in two places: the pipeline executor
//! honours `PipelineOptions::retry_policy`, and resilience middleware uses
//! [`execute_with_retry`] directly around arbitrary operations.
//!
//! ## Semantics
//!
//! - Only errors classified transient by [`PipelineError::is_transient`]
//!   are retried; everything else surfaces immediately
//! - After `max_attempts` the last error surfaces unchanged
//! - Sleeps run on the tokio timer; cancelling the caller's task aborts
//!   the sleep and the whole retry loop with it
//! - Optional jitter spreads synchronized retriers apart

use pipeline_kit_domain::error::PipelineError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Delay progression between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Constant(Duration),
    /// Delay grows by `base` per attempt: `base * attempt`
    Linear(Duration),
    /// Delay doubles per attempt: `base * 2^(attempt - 1)`
    Exponential(Duration),
}

/// Bounded retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one; `1` disables retrying
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    /// Multiplies each delay by a random factor in `0.5..1.5`
    pub jitter: bool,
}

impl RetryPolicy {
    /// Constant backoff policy
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Constant(delay),
            jitter: false,
        }
    }

    /// Linearly growing backoff policy
    pub fn linear(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Linear(base),
            jitter: false,
        }
    }

    /// Exponentially growing backoff policy
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Exponential(base),
            jitter: false,
        }
    }

    /// Enables delay jitter
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay to sleep after the given 1-based attempt fails
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = match self.backoff {
            BackoffStrategy::Constant(delay) => delay,
            BackoffStrategy::Linear(base) => base.saturating_mul(attempt),
            // Shift capped so pathological attempt counts cannot overflow.
            BackoffStrategy::Exponential(base) => base.saturating_mul(1u32 << (attempt - 1).min(20)),
        };
        if self.jitter {
            let factor: f64 = rand::rng().random_range(0.5..1.5);
            base.mul_f64(factor)
        } else {
            base
        }
    }
}

/// Runs `operation` under the policy, re-attempting transient failures.
///
/// The closure receives the 1-based attempt number. Cancellation of the
/// surrounding task aborts any in-progress sleep.
pub async fn execute_with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, PipelineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(attempt, ?delay, error = %err, "transient failure; retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

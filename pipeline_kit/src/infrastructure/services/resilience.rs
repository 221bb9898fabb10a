// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resilience Middleware
//!
//! Command-agnostic middleware wrapping the throttling and
//! failure-isolation primitives, so pipelines can adopt them without
//! writing glue:
//!
//! - [`RateLimitingMiddleware`] consults a shared [`RateLimiter`] in the
//!   rate-limiting phase, keyed by the invocation's user attribution
//! - [`CircuitBreakerMiddleware`] consults a shared [`CircuitBreaker`]
//!   before admitting work and records the outcome afterwards, rethrowing
//!   errors unchanged
//!
//! Both are blanket-implemented over every command type and deliberately
//! short-circuit on denial, so their guards are suppressed.
//!
//! Retry is intentionally absent from this set: a `Next` continuation can
//! run at most once, so re-attempting happens at the executor level
//! (`PipelineOptions::retry_policy`), where a fresh chain execution is
//! compiled per attempt.

use crate::infrastructure::services::circuit_breaker::CircuitBreaker;
use crate::infrastructure::services::rate_limiter::RateLimiter;
use pipeline_kit_domain::entities::CommandContext;
use pipeline_kit_domain::error::PipelineError;
use pipeline_kit_domain::services::{Command, Middleware, Next};
use pipeline_kit_domain::value_objects::ExecutionPriority;
use async_trait::async_trait;
use std::sync::Arc;

/// Identifier used for invocations that carry no user attribution.
const ANONYMOUS_IDENTIFIER: &str = "anonymous";

/// Middleware denying commands that exceed a shared rate limiter.
///
/// The limiter is consulted with the context's `user_id` (or
/// `"anonymous"`), which is what makes `PerUser`-scoped limiters work
/// without per-command glue. Denials surface as `RateLimitExceeded` and the
/// rest of the chain never runs.
pub struct RateLimitingMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitingMiddleware {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for RateLimitingMiddleware {
    async fn execute(&self, command: C, context: &mut CommandContext, next: Next<C>) -> Result<C::Output, PipelineError> {
        let identifier = context
            .metadata()
            .user_id()
            .unwrap_or(ANONYMOUS_IDENTIFIER)
            .to_string();
        self.limiter.check(&identifier)?;
        next.run(command, context).await
    }

    fn priority(&self) -> ExecutionPriority {
        ExecutionPriority::RateLimiting
    }

    fn name(&self) -> &'static str {
        "rate_limiting"
    }

    fn suppress_guard_diagnostics(&self) -> bool {
        // Denial is a deliberate short-circuit.
        true
    }
}

/// Middleware isolating a failing downstream behind a shared circuit
/// breaker.
///
/// The breaker is consulted before admitting work; afterwards the outcome
/// is recorded and the original result rethrown unchanged. While the
/// breaker is open, commands fail fast with `CircuitOpen` and the rest of
/// the chain never runs.
pub struct CircuitBreakerMiddleware {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerMiddleware {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

#[async_trait]
impl<C: Command> Middleware<C> for CircuitBreakerMiddleware {
    async fn execute(&self, command: C, context: &mut CommandContext, next: Next<C>) -> Result<C::Output, PipelineError> {
        self.breaker.check()?;
        let result = next.run(command, context).await;
        match &result {
            Ok(_) => self.breaker.record_success(),
            // Cancellation carries no downstream health signal.
            Err(PipelineError::Cancelled) => {}
            Err(_) => self.breaker.record_failure(),
        }
        result
    }

    fn priority(&self) -> ExecutionPriority {
        ExecutionPriority::ErrorHandling
    }

    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn suppress_guard_diagnostics(&self) -> bool {
        // Fail-fast while open is a deliberate short-circuit.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::pipeline_service::PipelineBuilder;
    use crate::infrastructure::services::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::infrastructure::services::rate_limiter::RateLimitScope;
    use pipeline_kit_domain::entities::CommandMetadata;
    use pipeline_kit_domain::services::CommandHandler;
    use std::time::Duration;

    #[derive(Clone)]
    struct Ping {
        fail: bool,
    }

    impl Command for Ping {
        type Output = &'static str;
    }

    struct PingHandler;

    #[async_trait]
    impl CommandHandler<Ping> for PingHandler {
        async fn handle(&self, command: Ping) -> Result<&'static str, PipelineError> {
            if command.fail {
                Err(PipelineError::internal("downstream unavailable"))
            } else {
                Ok("pong")
            }
        }
    }

    fn user_context(user: &str) -> CommandContext {
        CommandContext::new(CommandMetadata::new().with_user_id(user))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiting_keyed_by_user_attribution() {
        let limiter = Arc::new(RateLimiter::token_bucket(1.0, 0.0).with_scope(RateLimitScope::PerUser));
        let pipeline = PipelineBuilder::new(PingHandler)
            .with_middleware(RateLimitingMiddleware::new(limiter))
            .build();

        let mut context = user_context("alice");
        assert_eq!(pipeline.execute(Ping { fail: false }, &mut context).await, Ok("pong"));
        let err = pipeline.execute(Ping { fail: false }, &mut context).await.unwrap_err();
        assert!(matches!(err, PipelineError::RateLimitExceeded { .. }));

        // A different user has an independent allowance.
        let mut context = user_context("bob");
        assert_eq!(pipeline.execute(Ping { fail: false }, &mut context).await, Ok("pong"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_anonymous_invocations_share_one_scope() {
        let limiter = Arc::new(RateLimiter::token_bucket(1.0, 0.0).with_scope(RateLimitScope::PerUser));
        let pipeline = PipelineBuilder::new(PingHandler)
            .with_middleware(RateLimitingMiddleware::new(limiter))
            .build();

        let mut context = CommandContext::default();
        assert_eq!(pipeline.execute(Ping { fail: false }, &mut context).await, Ok("pong"));

        let mut other = CommandContext::default();
        let err = pipeline.execute(Ping { fail: false }, &mut other).await.unwrap_err();
        assert!(matches!(err, PipelineError::RateLimitExceeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_middleware_trips_and_recovers() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            timeout: Duration::from_secs(1),
            half_open_probes: 1,
        }));
        let pipeline = PipelineBuilder::new(PingHandler)
            .with_middleware(CircuitBreakerMiddleware::new(Arc::clone(&breaker)))
            .build();

        let mut context = CommandContext::default();
        for _ in 0..2 {
            let err = pipeline.execute(Ping { fail: true }, &mut context).await.unwrap_err();
            assert_eq!(err, PipelineError::internal("downstream unavailable"));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // Fail fast without reaching the handler.
        let err = pipeline.execute(Ping { fail: false }, &mut context).await.unwrap_err();
        assert_eq!(err, PipelineError::CircuitOpen);

        tokio::time::advance(Duration::from_millis(1_100)).await;
        assert_eq!(pipeline.execute(Ping { fail: false }, &mut context).await, Ok("pong"));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

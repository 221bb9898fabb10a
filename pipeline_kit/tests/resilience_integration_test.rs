// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resilience Integration Tests
//!
//! End-to-end scenarios for the throttling and failure-isolation
//! primitives: token-bucket refill over time, circuit-breaker trip and
//! recovery, and the shipped resilience middleware composing both around a
//! pipeline.

use async_trait::async_trait;
use pipeline_kit::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMiddleware, CircuitState, Command, CommandContext,
    CommandHandler, CommandMetadata, PipelineBuilder, PipelineError, RateLimitScope, RateLimiter,
    RateLimitingMiddleware,
};
use std::sync::Arc;
use std::time::Duration;

/// Token bucket: capacity 2, refill 1/s. Three rapid calls yield
/// `[true, true, false]`; after 1.1s the next call is allowed again.
#[tokio::test(start_paused = true)]
async fn test_token_bucket_refill_over_time() {
    let limiter = RateLimiter::token_bucket(2.0, 1.0).with_scope(RateLimitScope::PerUser);

    assert!(limiter.allow("u"));
    assert!(limiter.allow("u"));
    assert!(!limiter.allow("u"));

    tokio::time::advance(Duration::from_millis(1_100)).await;
    assert!(limiter.allow("u"));
}

/// Circuit breaker: threshold 3, timeout 1s. Three failures open the
/// breaker; requests are refused for the timeout window; a successful
/// probe closes it again.
#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_trip_and_recovery() {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 3,
        timeout: Duration::from_secs(1),
        half_open_probes: 1,
    });

    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Closed);
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    assert!(!breaker.allow_request());
    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(!breaker.allow_request(), "still open before the timeout");

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(breaker.allow_request(), "probe admitted after the timeout");
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.allow_request());
}

// ---------------------------------------------------------------------------
// Shipped resilience middleware composed around a pipeline
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Fetch {
    fail: bool,
}

impl Command for Fetch {
    type Output = &'static str;
}

struct FetchHandler;

#[async_trait]
impl CommandHandler<Fetch> for FetchHandler {
    async fn handle(&self, command: Fetch) -> Result<&'static str, PipelineError> {
        if command.fail {
            Err(PipelineError::internal("downstream unavailable"))
        } else {
            Ok("fetched")
        }
    }
}

fn user_context(user: &str) -> CommandContext {
    CommandContext::new(CommandMetadata::new().with_user_id(user))
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_pipeline_denies_with_typed_error() {
    let limiter = Arc::new(RateLimiter::token_bucket(1.0, 1.0).with_scope(RateLimitScope::PerUser));
    let pipeline = PipelineBuilder::new(FetchHandler)
        .with_middleware(RateLimitingMiddleware::new(limiter))
        .build();

    let mut context = user_context("u");
    assert_eq!(pipeline.execute(Fetch { fail: false }, &mut context).await, Ok("fetched"));

    let mut context = user_context("u");
    let err = pipeline.execute(Fetch { fail: false }, &mut context).await.unwrap_err();
    assert!(matches!(err, PipelineError::RateLimitExceeded { limit: 1, .. }));

    // Another user has an independent allowance.
    let mut context = user_context("v");
    assert_eq!(pipeline.execute(Fetch { fail: false }, &mut context).await, Ok("fetched"));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_middleware_isolates_failing_downstream() {
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        timeout: Duration::from_secs(1),
        half_open_probes: 1,
    }));
    let pipeline = PipelineBuilder::new(FetchHandler)
        .with_middleware(CircuitBreakerMiddleware::new(Arc::clone(&breaker)))
        .build();

    let mut context = CommandContext::default();

    // Two downstream failures trip the breaker; the original errors pass
    // through unchanged.
    for _ in 0..2 {
        let err = pipeline.execute(Fetch { fail: true }, &mut context).await.unwrap_err();
        assert_eq!(err, PipelineError::internal("downstream unavailable"));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // While open, the handler is never reached.
    let err = pipeline.execute(Fetch { fail: false }, &mut context).await.unwrap_err();
    assert_eq!(err, PipelineError::CircuitOpen);

    // After the timeout, one healthy probe closes the breaker.
    tokio::time::advance(Duration::from_millis(1_100)).await;
    assert_eq!(pipeline.execute(Fetch { fail: false }, &mut context).await, Ok("fetched"));
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_and_breaker_compose() {
    let limiter = Arc::new(RateLimiter::token_bucket(10.0, 1.0).with_scope(RateLimitScope::PerUser));
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        timeout: Duration::from_secs(1),
        half_open_probes: 1,
    }));
    let pipeline = PipelineBuilder::new(FetchHandler)
        .with_middleware(CircuitBreakerMiddleware::new(Arc::clone(&breaker)))
        .with_middleware(RateLimitingMiddleware::new(Arc::clone(&limiter)))
        .build();

    // Trip the breaker through real failures.
    let mut context = user_context("u");
    for _ in 0..2 {
        let _ = pipeline.execute(Fetch { fail: true }, &mut context).await;
    }

    // The rate-limiting phase (500) runs before error handling (900), so a
    // fail-fast from the open breaker still consumed rate-limit allowance.
    let err = pipeline.execute(Fetch { fail: false }, &mut context).await.unwrap_err();
    assert_eq!(err, PipelineError::CircuitOpen);
    assert!(limiter.tracked_scopes() >= 1);
}

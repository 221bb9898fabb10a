// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Circuit Breaker
//!
//! Failure-isolation state machine protecting downstream collaborators from
//! being hammered while they are unhealthy. Resilience middleware records
//! outcomes on a shared breaker and consults it before admitting work.
//!
//! ## State Machine
//!
//! ```text
//!          failure_count >= threshold
//! Closed ────────────────────────────► Open
//!   ▲                                   │ elapsed >= timeout
//!   │ any probe succeeds                ▼
//!   └─────────────────────────────── HalfOpen
//!                 probe fails ──────────► Open (openedAt refreshed)
//! ```
//!
//! - **Closed**: requests flow; successes decay the failure count,
//!   failures increment it. The transition fires on exactly the
//!   threshold, not one before.
//! - **Open**: every request is refused until `timeout` elapses.
//! - **HalfOpen**: up to `half_open_probes` trial requests are admitted
//!   concurrently; one success closes the breaker, one failure reopens it
//!   with a refreshed `opened_at`.
//!
//! Breakers are keyed by downstream identifier and shared across pipelines
//! through the [`CircuitBreakerRegistry`].

use pipeline_kit_domain::error::PipelineError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Circuit breaker tuning parameters.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive-failure budget in the closed state
    pub failure_threshold: u32,

    /// How long the breaker stays open before probing
    pub timeout: Duration,

    /// Concurrent trial requests admitted while half-open
    pub half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            half_open_probes: 1,
        }
    }
}

/// Public projection of the breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

enum InnerState {
    Closed { failure_count: u32 },
    Open { opened_at: Instant },
    HalfOpen { probes_in_flight: u32 },
}

/// Failure-isolation state machine; internally synchronized, shared by
/// handle.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<InnerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(InnerState::Closed { failure_count: 0 }),
        }
    }

    /// Whether a request may proceed right now
    ///
    /// In the open state this also performs the timed transition to
    /// half-open; in the half-open state it claims one probe slot.
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        match &mut *state {
            InnerState::Closed { .. } => true,
            InnerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.timeout {
                    debug!("circuit breaker probing: open -> half-open");
                    *state = InnerState::HalfOpen { probes_in_flight: 1 };
                    true
                } else {
                    false
                }
            }
            InnerState::HalfOpen { probes_in_flight } => {
                if *probes_in_flight < self.config.half_open_probes {
                    *probes_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Fails with `CircuitOpen` when requests are not admitted
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.allow_request() {
            Ok(())
        } else {
            Err(PipelineError::CircuitOpen)
        }
    }

    /// Records a successful outcome
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            InnerState::Closed { failure_count } => {
                *failure_count = failure_count.saturating_sub(1);
            }
            InnerState::HalfOpen { .. } => {
                debug!("circuit breaker recovered: half-open -> closed");
                *state = InnerState::Closed { failure_count: 0 };
            }
            // A success racing the open transition carries no signal.
            InnerState::Open { .. } => {}
        }
    }

    /// Records a failed outcome
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            InnerState::Closed { failure_count } => {
                *failure_count += 1;
                if *failure_count >= self.config.failure_threshold {
                    debug!(failures = *failure_count, "circuit breaker tripped: closed -> open");
                    *state = InnerState::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            InnerState::HalfOpen { .. } => {
                debug!("circuit breaker probe failed: half-open -> open");
                *state = InnerState::Open {
                    opened_at: Instant::now(),
                };
            }
            InnerState::Open { .. } => {}
        }
    }

    /// Reads the current state
    pub fn state(&self) -> CircuitState {
        match &*self.state.lock() {
            InnerState::Closed { .. } => CircuitState::Closed,
            InnerState::Open { .. } => CircuitState::Open,
            InnerState::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Keyed registry handing out shared breakers.
///
/// Pipelines protecting the same downstream identifier receive the same
/// breaker handle, so failures observed anywhere isolate the downstream
/// everywhere.
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Creates a registry issuing breakers with `default_config`
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared breaker for `key`, creating it on first use
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(
            breakers
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(self.default_config.clone()))),
        )
    }

    /// Returns the shared breaker for `key` with an explicit configuration
    ///
    /// The configuration applies only when the breaker is created here;
    /// an existing breaker keeps its original tuning.
    pub fn breaker_with(&self, key: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(
            breakers
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(config))),
        )
    }

    /// Number of breakers tracked
    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    /// Returns true when no breakers were issued yet
    pub fn is_empty(&self) -> bool {
        self.breakers.lock().is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, timeout: Duration, probes: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            timeout,
            half_open_probes: probes,
        })
    }

    #[test]
    fn test_trips_on_exactly_the_threshold() {
        let breaker = breaker(3, Duration::from_secs(1), 1);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed, "one before threshold stays closed");

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_success_decays_failures() {
        let breaker = breaker(2, Duration::from_secs(1), 1);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        // Decay kept the count below the threshold.
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_transitions_to_half_open_after_timeout() {
        let breaker = breaker(1, Duration::from_secs(1), 1);
        breaker.record_failure();
        assert!(!breaker.allow_request());

        tokio::time::advance(Duration::from_millis(1_100)).await;
        assert!(breaker.allow_request(), "first probe admitted after timeout");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_budget() {
        let breaker = breaker(1, Duration::from_secs(1), 2);
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(breaker.allow_request());
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request(), "probe budget exhausted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes() {
        let breaker = breaker(1, Duration::from_secs(1), 1);
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(breaker.allow_request());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens_with_fresh_clock() {
        let breaker = breaker(1, Duration::from_secs(1), 1);
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Not yet: opened_at was refreshed by the probe failure.
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!breaker.allow_request());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_check_maps_to_circuit_open() {
        let breaker = breaker(1, Duration::from_secs(10), 1);
        assert!(breaker.check().is_ok());
        breaker.record_failure();
        assert_eq!(breaker.check().unwrap_err(), PipelineError::CircuitOpen);
    }

    #[test]
    fn test_registry_shares_breakers_by_key() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.breaker("payments");
        let b = registry.breaker("payments");
        let c = registry.breaker("search");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);

        a.record_failure();
        // Shared state: the failure is visible through the other handle.
        b.record_failure();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        assert_eq!(c.state(), CircuitState::Closed);
        assert_eq!(a.state(), CircuitState::Open);
    }
}

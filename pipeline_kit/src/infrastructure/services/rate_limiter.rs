// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rate Limiter
//!
//! Scoped request throttling with three strategies sharing one decision
//! API. Rate-limiting middleware consults a shared limiter before admitting
//! a command; denials surface as `RateLimitExceeded` carrying the limit and
//! a retry hint.
//!
//! ## Strategies
//!
//! - **Token bucket**: `capacity` tokens refilled continuously at
//!   `refill_rate` tokens/second. A request costing more than the available
//!   tokens is denied with `retry_after = (cost - tokens) / refill_rate`.
//! - **Sliding window**: at most `max_requests` events inside the trailing
//!   `window`. Events aged exactly the window length no longer count.
//! - **Adaptive**: scales the wrapped strategy's allowance by
//!   `1 - load_factor()`, where the load factor is an external signal in
//!   `[0, 1]` (queue depth, CPU, error rate - the limiter does not care).
//!
//! ## Determinism
//!
//! Boundary ties **allow**: a bucket holding exactly `cost` tokens admits
//! the request, and a window event aged exactly `window` has expired. Tests
//! rely on this rounding direction.
//!
//! ## Scopes
//!
//! A limiter maintains independent state per scope key: one global key, the
//! caller-supplied identifier (`PerUser`), or a derived key (`PerKey`).
//! Idle scope entries are evicted after `idle_ttl` so per-user maps do not
//! grow without bound.
//!
//! Decisions are linearizable per scope key (one lock guards the state
//! map); contention never surfaces as an error.

use pipeline_kit_domain::error::PipelineError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Base throttling strategy.
#[derive(Debug, Clone, Copy)]
pub enum RateLimitStrategy {
    TokenBucket { capacity: f64, refill_rate: f64 },
    SlidingWindow { window: Duration, max_requests: usize },
}

/// Key space over which a limit applies.
#[derive(Clone)]
pub enum RateLimitScope {
    /// One shared allowance for every caller
    Global,
    /// Independent allowance per caller identifier
    PerUser,
    /// Independent allowance per derived key
    PerKey(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl std::fmt::Debug for RateLimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitScope::Global => write!(f, "Global"),
            RateLimitScope::PerUser => write!(f, "PerUser"),
            RateLimitScope::PerKey(_) => write!(f, "PerKey(..)"),
        }
    }
}

/// Outcome of one admission decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Configured allowance (bucket capacity or window maximum)
    pub limit: u64,
    /// Hint for when a denied request may succeed
    pub retry_after: Option<Duration>,
}

enum ScopeState {
    Bucket { tokens: f64, last_refill: Instant },
    Window { events: VecDeque<Instant> },
}

struct ScopeEntry {
    state: ScopeState,
    last_seen: Instant,
}

struct LimiterState {
    entries: HashMap<String, ScopeEntry>,
    last_eviction: Instant,
}

/// Scoped rate limiter; internally synchronized, shared by handle.
pub struct RateLimiter {
    strategy: RateLimitStrategy,
    scope: RateLimitScope,
    /// External load signal for the adaptive wrapper; `None` keeps the base
    /// strategy unscaled.
    load_factor: Option<Arc<dyn Fn() -> f64 + Send + Sync>>,
    idle_ttl: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(300);

    /// Token-bucket limiter with the global scope
    pub fn token_bucket(capacity: f64, refill_rate: f64) -> Self {
        Self::with_strategy(RateLimitStrategy::TokenBucket { capacity, refill_rate })
    }

    /// Sliding-window limiter with the global scope
    pub fn sliding_window(window: Duration, max_requests: usize) -> Self {
        Self::with_strategy(RateLimitStrategy::SlidingWindow { window, max_requests })
    }

    /// Adaptive limiter scaling `base` by `1 - load_factor()`
    pub fn adaptive(base: RateLimitStrategy, load_factor: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        let mut limiter = Self::with_strategy(base);
        limiter.load_factor = Some(Arc::new(load_factor));
        limiter
    }

    fn with_strategy(strategy: RateLimitStrategy) -> Self {
        Self {
            strategy,
            scope: RateLimitScope::Global,
            load_factor: None,
            idle_ttl: Self::DEFAULT_IDLE_TTL,
            state: Mutex::new(LimiterState {
                entries: HashMap::new(),
                last_eviction: Instant::now(),
            }),
        }
    }

    /// Sets the scope
    pub fn with_scope(mut self, scope: RateLimitScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the idle-entry eviction horizon
    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    /// Admission decision for a unit-cost request
    pub fn allow(&self, identifier: &str) -> bool {
        self.decide(identifier, 1.0).allowed
    }

    /// Full admission decision for a request of the given cost
    pub fn decide(&self, identifier: &str, cost: f64) -> RateLimitDecision {
        let key = self.scope_key(identifier);
        let now = Instant::now();
        let mut state = self.state.lock();

        if now.duration_since(state.last_eviction) >= self.idle_ttl {
            let horizon = self.idle_ttl;
            state.entries.retain(|_, entry| now.duration_since(entry.last_seen) < horizon);
            state.last_eviction = now;
            debug!(tracked = state.entries.len(), "evicted idle rate-limit scopes");
        }

        let load_scale = self
            .load_factor
            .as_ref()
            .map(|lf| (1.0 - lf().clamp(0.0, 1.0)).clamp(0.0, 1.0))
            .unwrap_or(1.0);

        match self.strategy {
            RateLimitStrategy::TokenBucket { capacity, refill_rate } => {
                let effective_rate = refill_rate * load_scale;
                let entry = state.entries.entry(key).or_insert_with(|| ScopeEntry {
                    state: ScopeState::Bucket {
                        tokens: capacity,
                        last_refill: now,
                    },
                    last_seen: now,
                });
                entry.last_seen = now;
                let ScopeState::Bucket { tokens, last_refill } = &mut entry.state else {
                    return RateLimitDecision {
                        allowed: false,
                        limit: capacity as u64,
                        retry_after: None,
                    };
                };

                let elapsed = now.duration_since(*last_refill).as_secs_f64();
                *tokens = (*tokens + elapsed * effective_rate).min(capacity);
                *last_refill = now;

                if *tokens >= cost {
                    *tokens -= cost;
                    RateLimitDecision {
                        allowed: true,
                        limit: capacity as u64,
                        retry_after: None,
                    }
                } else {
                    let retry_after = if effective_rate > 0.0 {
                        Some(Duration::from_secs_f64((cost - *tokens) / effective_rate))
                    } else {
                        None
                    };
                    RateLimitDecision {
                        allowed: false,
                        limit: capacity as u64,
                        retry_after,
                    }
                }
            }
            RateLimitStrategy::SlidingWindow { window, max_requests } => {
                let effective_max = ((max_requests as f64) * load_scale).floor() as usize;
                let entry = state.entries.entry(key).or_insert_with(|| ScopeEntry {
                    state: ScopeState::Window {
                        events: VecDeque::new(),
                    },
                    last_seen: now,
                });
                entry.last_seen = now;
                let ScopeState::Window { events } = &mut entry.state else {
                    return RateLimitDecision {
                        allowed: false,
                        limit: max_requests as u64,
                        retry_after: None,
                    };
                };

                // Events aged exactly the window length have expired.
                while let Some(front) = events.front() {
                    if now.duration_since(*front) >= window {
                        events.pop_front();
                    } else {
                        break;
                    }
                }

                if events.len() < effective_max {
                    events.push_back(now);
                    RateLimitDecision {
                        allowed: true,
                        limit: max_requests as u64,
                        retry_after: None,
                    }
                } else {
                    let retry_after = events
                        .front()
                        .map(|oldest| window.saturating_sub(now.duration_since(*oldest)));
                    RateLimitDecision {
                        allowed: false,
                        limit: max_requests as u64,
                        retry_after,
                    }
                }
            }
        }
    }

    /// Fails with `RateLimitExceeded` when the request is denied
    pub fn check(&self, identifier: &str) -> Result<(), PipelineError> {
        let decision = self.decide(identifier, 1.0);
        if decision.allowed {
            Ok(())
        } else {
            Err(PipelineError::RateLimitExceeded {
                limit: decision.limit,
                reset_time: decision.retry_after,
                scope: Some(self.scope_key(identifier)),
            })
        }
    }

    /// Number of scope entries currently tracked
    pub fn tracked_scopes(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn scope_key(&self, identifier: &str) -> String {
        match &self.scope {
            RateLimitScope::Global => "global".to_string(),
            RateLimitScope::PerUser => identifier.to_string(),
            RateLimitScope::PerKey(derive) => derive(identifier),
        }
    }
}

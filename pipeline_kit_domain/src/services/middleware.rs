// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Middleware Contract and Next Guard
//!
//! This module defines the [`Middleware`] contract - the ordered wrappers a
//! command flows through before reaching its handler - together with the
//! [`Next`] continuation handle and the [`NextGuard`] state machine that
//! enforces the exactly-once invocation contract.
//!
//! ## Overview
//!
//! A middleware receives the command, the invocation context, and a `next`
//! continuation representing the rest of the chain. It must either:
//!
//! - invoke `next` **exactly once** and return (possibly transformed) what
//!   the rest of the chain produced, or
//! - invoke `next` **zero times** and produce a result of the correct type
//!   itself (a cached response, a rejection, a short-circuit).
//!
//! Invoking `next` from two tasks concurrently, or twice in sequence, is a
//! contract violation surfaced as [`PipelineError::NextCurrentlyExecuting`]
//! or [`PipelineError::NextAlreadyCalled`].
//!
//! ## Guard State Machine
//!
//! Every `Next` carries a guard with three states and atomic transitions:
//!
//! ```text
//! Pending ──run()──► Executing ──return/cancel──► Completed
//! ```
//!
//! - Entering from `Completed` fails with `NextAlreadyCalled`
//! - Entering from `Executing` fails with `NextCurrentlyExecuting`
//! - Cancellation during `Executing` transitions to `Completed` without
//!   error; the guard is never left wedged
//!
//! In Rust, `Next::run` consumes the handle, so a *second* call is already
//! unrepresentable in safe code. The guard remains the runtime source of
//! truth: it backs the cancellation transition, the post-execution
//! invariant (`Completed` or never entered), and the drop diagnostic below.
//!
//! ## Drop Diagnostics
//!
//! Dropping a `Next` that is still `Pending` - a middleware returned without
//! calling or explicitly short-circuiting - emits a diagnostic through the
//! pluggable [`GuardDiagnosticsSink`]. Diagnostics are skipped when:
//!
//! - the execution was cancelled (the chain marks the cancellation flag
//!   before the guard observes the drop),
//! - the owning middleware opted out via
//!   [`Middleware::suppress_guard_diagnostics`] (deliberate short-circuits),
//! - diagnostics were disabled globally with
//!   [`set_guard_diagnostics_enabled`], or
//! - the `PIPELINE_KIT_DISABLE_NEXTGUARD_WARNINGS` environment variable is
//!   set.

use crate::entities::CommandContext;
use crate::error::PipelineError;
use crate::services::Command;
use crate::value_objects::ExecutionPriority;
use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Middleware wrapping a `next` continuation, ordered by priority.
///
/// Implementations are parameterized per command type so compiled chains
/// stay statically typed; a command-agnostic middleware provides a blanket
/// implementation:
///
/// ```
/// use async_trait::async_trait;
/// use pipeline_kit_domain::entities::CommandContext;
/// use pipeline_kit_domain::services::{Command, Middleware, Next};
/// use pipeline_kit_domain::PipelineError;
///
/// struct Timing;
///
/// #[async_trait]
/// impl<C: Command> Middleware<C> for Timing {
///     async fn execute(
///         &self,
///         command: C,
///         context: &mut CommandContext,
///         next: Next<C>,
///     ) -> Result<C::Output, PipelineError> {
///         let started = std::time::Instant::now();
///         let result = next.run(command, context).await;
///         context.record_metric("elapsed_ms", started.elapsed().as_secs_f64() * 1_000.0);
///         result
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware<C: Command>: Send + Sync {
    /// Wraps the rest of the chain
    ///
    /// The `next` handle must be invoked zero or one time; see the module
    /// documentation for the full contract.
    async fn execute(
        &self,
        command: C,
        context: &mut CommandContext,
        next: Next<C>,
    ) -> Result<C::Output, PipelineError>;

    /// Phase selecting this middleware's position in the chain
    fn priority(&self) -> ExecutionPriority {
        ExecutionPriority::Custom
    }

    /// Stable name used in diagnostics and metric tags
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Opts this middleware's guard out of drop diagnostics
    ///
    /// Middleware that deliberately short-circuit (caches, admission gates)
    /// return true so an unused `next` is not reported.
    fn suppress_guard_diagnostics(&self) -> bool {
        false
    }
}

/// Invoker for a compiled chain segment.
///
/// Implemented by the chain compiler in the infrastructure layer; the
/// domain only needs the ability to resume execution at a given middleware
/// index. `Arc<Self>` receivers keep the trait object-safe while letting
/// the returned future own its chain reference.
pub trait ChainInvoker<C: Command>: Send + Sync {
    /// Executes the chain from `index` onward (the handler sits one past
    /// the last middleware)
    fn invoke_segment<'a>(
        self: Arc<Self>,
        index: usize,
        command: C,
        context: &'a mut CommandContext,
    ) -> BoxFuture<'a, Result<C::Output, PipelineError>>;
}

/// Guard state as observed through [`NextGuard::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Pending,
    Executing,
    Completed,
}

const STATE_PENDING: u8 = 0;
const STATE_EXECUTING: u8 = 1;
const STATE_COMPLETED: u8 = 2;

/// Atomic tri-state enforcing the exactly-once `next` contract.
///
/// Cloned handles share one state cell; the clone given to the execution
/// frame performs the `Executing → Completed` transition even when the
/// frame is dropped by cancellation.
#[derive(Debug, Clone)]
pub struct NextGuard {
    state: Arc<AtomicU8>,
}

impl NextGuard {
    /// Creates a guard in the `Pending` state
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(STATE_PENDING)),
        }
    }

    /// Attempts the `Pending → Executing` transition
    ///
    /// Fails with the contract-violation error matching the state the guard
    /// was actually in.
    pub fn begin(&self) -> Result<(), PipelineError> {
        match self
            .state
            .compare_exchange(STATE_PENDING, STATE_EXECUTING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(STATE_EXECUTING) => Err(PipelineError::NextCurrentlyExecuting),
            Err(_) => Err(PipelineError::NextAlreadyCalled),
        }
    }

    /// Forces the terminal `Completed` state
    ///
    /// Idempotent; used on normal return and on cancellation mid-execution.
    pub fn complete(&self) {
        self.state.store(STATE_COMPLETED, Ordering::Release);
    }

    /// Reads the current state
    pub fn state(&self) -> GuardState {
        match self.state.load(Ordering::Acquire) {
            STATE_PENDING => GuardState::Pending,
            STATE_EXECUTING => GuardState::Executing,
            _ => GuardState::Completed,
        }
    }

    /// Returns true while the guard has not been entered
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_PENDING
    }
}

impl Default for NextGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion frame: transitions the guard to `Completed` when dropped.
///
/// Lives across the `invoke_segment` await inside [`Next::run`]; if the
/// caller is cancelled mid-execution the frame still drops, so the guard
/// never stays in `Executing`.
struct ExecutionFrame {
    guard: NextGuard,
}

impl Drop for ExecutionFrame {
    fn drop(&mut self) {
        self.guard.complete();
    }
}

struct NextInner<C: Command> {
    chain: Arc<dyn ChainInvoker<C>>,
    index: usize,
    guard: NextGuard,
    middleware_name: &'static str,
    suppress_diagnostics: bool,
    execution_cancelled: Arc<AtomicBool>,
}

/// Continuation handle representing the rest of a compiled chain.
///
/// `run` consumes the handle, making a second invocation unrepresentable;
/// the embedded [`NextGuard`] enforces the remaining runtime contract and
/// feeds the drop diagnostic.
pub struct Next<C: Command> {
    inner: Option<NextInner<C>>,
}

impl<C: Command> Next<C> {
    /// Creates a continuation resuming `chain` at `index`
    ///
    /// `execution_cancelled` is the per-execution cancellation flag the
    /// chain sets before its frames unwind; it suppresses the spurious
    /// pending-drop diagnostic on the cancellation path.
    pub fn new(
        chain: Arc<dyn ChainInvoker<C>>,
        index: usize,
        middleware_name: &'static str,
        suppress_diagnostics: bool,
        execution_cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Some(NextInner {
                chain,
                index,
                guard: NextGuard::new(),
                middleware_name,
                suppress_diagnostics,
                execution_cancelled,
            }),
        }
    }

    /// Reads the guard state (diagnostics and tests)
    pub fn guard_state(&self) -> GuardState {
        match &self.inner {
            Some(inner) => inner.guard.state(),
            None => GuardState::Completed,
        }
    }

    /// Invokes the rest of the chain
    ///
    /// Consumes the handle. The guard transitions `Pending → Executing` on
    /// entry and reaches `Completed` on return *and* on cancellation
    /// mid-execution.
    pub async fn run(mut self, command: C, context: &mut CommandContext) -> Result<C::Output, PipelineError> {
        let inner = match self.inner.take() {
            Some(inner) => inner,
            // Unreachable through safe use: run() consumes the handle.
            None => return Err(PipelineError::NextAlreadyCalled),
        };
        inner.guard.begin()?;
        let frame = ExecutionFrame {
            guard: inner.guard.clone(),
        };
        let result = inner.chain.invoke_segment(inner.index, command, context).await;
        drop(frame);
        result
    }
}

impl<C: Command> Drop for Next<C> {
    fn drop(&mut self) {
        let Some(inner) = &self.inner else {
            return;
        };
        if !inner.guard.is_pending() {
            return;
        }
        inner.guard.complete();
        if inner.execution_cancelled.load(Ordering::Acquire) {
            return;
        }
        emit_unused_next_diagnostic(inner.middleware_name, inner.suppress_diagnostics);
    }
}

// ---------------------------------------------------------------------------
// Guard diagnostics sink
// ---------------------------------------------------------------------------

/// Pluggable sink receiving guard diagnostics.
///
/// The infrastructure layer installs a `tracing`-backed sink; the default
/// writes to stderr so misbehaving middleware is visible even without a
/// subscriber.
pub trait GuardDiagnosticsSink: Send + Sync {
    /// A middleware returned while its `next` continuation was never invoked
    fn unused_next(&self, middleware_name: &str);
}

struct StderrGuardDiagnostics;

impl GuardDiagnosticsSink for StderrGuardDiagnostics {
    fn unused_next(&self, middleware_name: &str) {
        eprintln!(
            "[pipeline-kit] middleware '{}' returned without invoking next; \
             short-circuiting middleware should suppress this diagnostic",
            middleware_name
        );
    }
}

static GUARD_DIAGNOSTICS_SINK: Lazy<RwLock<Arc<dyn GuardDiagnosticsSink>>> =
    Lazy::new(|| RwLock::new(Arc::new(StderrGuardDiagnostics)));

static GUARD_DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Environment kill switch, read once per process.
static GUARD_DIAGNOSTICS_ENV_DISABLED: Lazy<bool> = Lazy::new(|| {
    std::env::var("PIPELINE_KIT_DISABLE_NEXTGUARD_WARNINGS")
        .map(|value| {
            let value = value.trim();
            !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
        })
        .unwrap_or(false)
});

/// Installs the process-wide guard diagnostics sink
pub fn set_guard_diagnostics_sink(sink: Arc<dyn GuardDiagnosticsSink>) {
    *GUARD_DIAGNOSTICS_SINK.write() = sink;
}

/// Globally enables or disables guard diagnostics
pub fn set_guard_diagnostics_enabled(enabled: bool) {
    GUARD_DIAGNOSTICS_ENABLED.store(enabled, Ordering::Release);
}

/// Returns true when guard diagnostics are currently emitted
pub fn guard_diagnostics_enabled() -> bool {
    GUARD_DIAGNOSTICS_ENABLED.load(Ordering::Acquire) && !*GUARD_DIAGNOSTICS_ENV_DISABLED
}

fn emit_unused_next_diagnostic(middleware_name: &str, suppressed_by_middleware: bool) {
    if suppressed_by_middleware || !guard_diagnostics_enabled() {
        return;
    }
    let sink = Arc::clone(&*GUARD_DIAGNOSTICS_SINK.read());
    sink.unused_next(middleware_name);
}

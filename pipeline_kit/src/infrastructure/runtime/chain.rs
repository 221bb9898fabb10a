// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chain Compiler and Executor
//!
//! This module compiles an ordered middleware sequence plus a terminal
//! handler into an immutable, executable chain, and drives one execution of
//! that chain per command.
//!
//! ## Compilation
//!
//! Compilation happens exactly once, at pipeline build time:
//!
//! 1. Middleware are stably sorted by `(priority value, insertion index)` -
//!    a stable sort keeps insertion order for equal priorities
//! 2. The sorted sequence and the handler become a [`CompiledChain`], an
//!    immutable artifact safe to share across executions without locking
//!
//! The compiler is pure: it performs no I/O and cannot fail.
//!
//! ## Execution Model
//!
//! Execution walks the sorted sequence by index. The middleware at index
//! `k` receives a [`Next`] continuation resuming at `k + 1`; the position
//! one past the last middleware invokes the handler. Each frame is a boxed
//! future, which keeps the recursive walk finitely typed and lets any
//! middleware suspend freely.
//!
//! ## Cancellation
//!
//! Every execution owns a cancellation flag. A sentinel inside
//! [`CompiledChain::execute`] raises the flag when the execution future is
//! dropped before completing, *before* the in-flight frames unwind - so
//! `Next` handles dropped while still pending know the drop was a
//! cancellation and skip the unused-`next` diagnostic.

use pipeline_kit_domain::entities::CommandContext;
use pipeline_kit_domain::error::PipelineError;
use pipeline_kit_domain::services::{ChainInvoker, Command, CommandHandler, Middleware, Next};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ChainInner<C: Command> {
    middleware: Vec<Arc<dyn Middleware<C>>>,
    handler: Arc<dyn CommandHandler<C>>,
}

/// Immutable compiled artifact: ordered middleware plus the terminal
/// handler.
///
/// Built once, executed many times; the handle is cheap to clone and all
/// clones share the compiled sequence.
pub struct CompiledChain<C: Command> {
    inner: Arc<ChainInner<C>>,
}

impl<C: Command> Clone for CompiledChain<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Command> CompiledChain<C> {
    /// Compiles middleware and handler into an executable chain
    ///
    /// Sorts by priority value; the sort is stable, so middleware with
    /// equal priorities keep the order they were added in.
    pub fn compile(mut middleware: Vec<Arc<dyn Middleware<C>>>, handler: Arc<dyn CommandHandler<C>>) -> Self {
        middleware.sort_by_key(|m| m.priority().value());
        Self {
            inner: Arc::new(ChainInner { middleware, handler }),
        }
    }

    /// Number of middleware in the compiled sequence
    pub fn middleware_count(&self) -> usize {
        self.inner.middleware.len()
    }

    /// Names of the compiled middleware, in execution order
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.inner.middleware.iter().map(|m| m.name()).collect()
    }

    /// Executes the chain once for `command`
    ///
    /// Errors from middleware and handler propagate unchanged. Dropping the
    /// returned future cancels the execution; in-flight guards transition
    /// to their terminal state and no spurious diagnostics are emitted.
    pub async fn execute(&self, command: C, context: &mut CommandContext) -> Result<C::Output, PipelineError> {
        let execution = Arc::new(ChainExecution {
            chain: Arc::clone(&self.inner),
            cancelled: Arc::new(AtomicBool::new(false)),
        });
        let invocation = Arc::clone(&execution).invoke_segment(0, command, context);
        // Declared after `invocation` so it drops first on cancellation and
        // flags the frames before they unwind.
        let sentinel = CancellationSentinel {
            flag: Arc::clone(&execution.cancelled),
            armed: true,
        };
        let result = invocation.await;
        sentinel.disarm();
        result
    }
}

/// One execution of a compiled chain: the shared sequence plus this
/// invocation's cancellation flag.
struct ChainExecution<C: Command> {
    chain: Arc<ChainInner<C>>,
    cancelled: Arc<AtomicBool>,
}

impl<C: Command> ChainInvoker<C> for ChainExecution<C> {
    fn invoke_segment<'a>(
        self: Arc<Self>,
        index: usize,
        command: C,
        context: &'a mut CommandContext,
    ) -> BoxFuture<'a, Result<C::Output, PipelineError>> {
        Box::pin(async move {
            if let Some(middleware) = self.chain.middleware.get(index).map(Arc::clone) {
                let next = Next::new(
                    Arc::clone(&self) as Arc<dyn ChainInvoker<C>>,
                    index + 1,
                    middleware.name(),
                    middleware.suppress_guard_diagnostics(),
                    Arc::clone(&self.cancelled),
                );
                middleware.execute(command, context, next).await
            } else {
                self.chain.handler.handle(command).await
            }
        })
    }
}

/// Raises the execution's cancellation flag when dropped while armed.
struct CancellationSentinel {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancellationSentinel {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancellationSentinel {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pipeline_kit_domain::value_objects::ExecutionPriority;
    use std::future::Future;

    #[derive(Clone)]
    struct Add {
        a: i64,
        b: i64,
    }

    impl Command for Add {
        type Output = i64;
    }

    struct AddHandler;

    #[async_trait]
    impl CommandHandler<Add> for AddHandler {
        async fn handle(&self, command: Add) -> Result<i64, PipelineError> {
            Ok(command.a + command.b)
        }
    }

    /// Records enter/exit events into a shared trace.
    struct Recording {
        label: &'static str,
        priority: ExecutionPriority,
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware<Add> for Recording {
        async fn execute(
            &self,
            command: Add,
            context: &mut CommandContext,
            next: Next<Add>,
        ) -> Result<i64, PipelineError> {
            self.trace.lock().push(format!("{}_pre", self.label));
            let result = next.run(command, context).await;
            self.trace.lock().push(format!("{}_post", self.label));
            result
        }

        fn priority(&self) -> ExecutionPriority {
            self.priority
        }
    }

    /// Short-circuits with a fixed value, never invoking next.
    struct ShortCircuit(i64);

    #[async_trait]
    impl Middleware<Add> for ShortCircuit {
        async fn execute(
            &self,
            _command: Add,
            _context: &mut CommandContext,
            _next: Next<Add>,
        ) -> Result<i64, PipelineError> {
            Ok(self.0)
        }

        fn suppress_guard_diagnostics(&self) -> bool {
            true
        }
    }

    struct Failing;

    #[async_trait]
    impl Middleware<Add> for Failing {
        async fn execute(
            &self,
            _command: Add,
            _context: &mut CommandContext,
            _next: Next<Add>,
        ) -> Result<i64, PipelineError> {
            Err(PipelineError::internal("middleware exploded"))
        }

        fn suppress_guard_diagnostics(&self) -> bool {
            true
        }
    }

    fn handler_only() -> CompiledChain<Add> {
        CompiledChain::compile(Vec::new(), Arc::new(AddHandler))
    }

    #[tokio::test]
    async fn test_handler_only_chain() {
        let chain = handler_only();
        let mut context = CommandContext::default();
        let result = chain.execute(Add { a: 5, b: 3 }, &mut context).await.unwrap();
        assert_eq!(result, 8);
    }

    #[tokio::test]
    async fn test_middleware_run_in_priority_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        // Added post-processing first; priority sorting must still put
        // authentication on the outside.
        let chain = CompiledChain::compile(
            vec![
                Arc::new(Recording {
                    label: "post",
                    priority: ExecutionPriority::PostProcessing,
                    trace: Arc::clone(&trace),
                }) as Arc<dyn Middleware<Add>>,
                Arc::new(Recording {
                    label: "auth",
                    priority: ExecutionPriority::Authentication,
                    trace: Arc::clone(&trace),
                }),
            ],
            Arc::new(AddHandler),
        );

        let mut context = CommandContext::default();
        let result = chain.execute(Add { a: 2, b: 2 }, &mut context).await.unwrap();
        assert_eq!(result, 4);
        assert_eq!(
            trace.lock().as_slice(),
            ["auth_pre", "post_pre", "post_post", "auth_post"]
        );
    }

    #[tokio::test]
    async fn test_equal_priorities_keep_insertion_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let chain = CompiledChain::compile(
            vec![
                Arc::new(Recording {
                    label: "first",
                    priority: ExecutionPriority::Custom,
                    trace: Arc::clone(&trace),
                }) as Arc<dyn Middleware<Add>>,
                Arc::new(Recording {
                    label: "second",
                    priority: ExecutionPriority::Custom,
                    trace: Arc::clone(&trace),
                }),
            ],
            Arc::new(AddHandler),
        );

        let mut context = CommandContext::default();
        chain.execute(Add { a: 0, b: 0 }, &mut context).await.unwrap();
        assert_eq!(
            trace.lock().as_slice(),
            ["first_pre", "second_pre", "second_post", "first_post"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let chain = CompiledChain::compile(
            vec![Arc::new(ShortCircuit(42)) as Arc<dyn Middleware<Add>>],
            Arc::new(AddHandler),
        );
        let mut context = CommandContext::default();
        let result = chain.execute(Add { a: 5, b: 3 }, &mut context).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_errors_propagate_unchanged() {
        let chain = CompiledChain::compile(
            vec![Arc::new(Failing) as Arc<dyn Middleware<Add>>],
            Arc::new(AddHandler),
        );
        let mut context = CommandContext::default();
        let err = chain.execute(Add { a: 1, b: 1 }, &mut context).await.unwrap_err();
        assert_eq!(err, PipelineError::internal("middleware exploded"));
    }

    #[tokio::test]
    async fn test_middleware_count_and_names() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let chain = CompiledChain::compile(
            vec![Arc::new(Recording {
                label: "only",
                priority: ExecutionPriority::Validation,
                trace,
            }) as Arc<dyn Middleware<Add>>],
            Arc::new(AddHandler),
        );
        assert_eq!(chain.middleware_count(), 1);
        assert_eq!(chain.middleware_names().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_mid_chain_flags_execution() {
        struct Stall;

        #[async_trait]
        impl Middleware<Add> for Stall {
            async fn execute(
                &self,
                _command: Add,
                _context: &mut CommandContext,
                _next: Next<Add>,
            ) -> Result<i64, PipelineError> {
                futures::future::pending::<()>().await;
                Err(PipelineError::Cancelled)
            }

            fn suppress_guard_diagnostics(&self) -> bool {
                true
            }
        }

        let chain = CompiledChain::compile(
            vec![Arc::new(Stall) as Arc<dyn Middleware<Add>>],
            Arc::new(AddHandler),
        );
        let mut context = CommandContext::default();
        {
            let mut fut = Box::pin(chain.execute(Add { a: 1, b: 1 }, &mut context));
            let waker = futures::task::noop_waker();
            let mut cx = std::task::Context::from_waker(&waker);
            assert!(fut.as_mut().poll(&mut cx).is_pending());
            // Dropping the pinned future cancels the execution; the test
            // passes when no guard diagnostic panics or deadlocks occur.
        }
        // A fresh execution on the same chain still works.
        let result = chain.execute(Add { a: 3, b: 4 }, &mut context).await.unwrap();
        assert_eq!(result, 7);
    }
}

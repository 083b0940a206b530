//! The execution state machine.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::StepConfig;
use crate::env::EnvVars;
use crate::error::{BoxError, Error, Result};
use crate::resources::StepResources;
use crate::wrapper::{Disposer, SetupContext, Wrapper};

use super::body::{BodyInvocation, BodyInvoker, CompletionObserver};
use super::callback;
use super::context::CancelHandle;

/// Lifecycle state of an [`Execution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// Started, setup not finished.
    Created,
    /// Setup succeeded; the body has not been dispatched yet.
    SetupDone,
    /// The body was dispatched and has not reported.
    BodyRunning,
    /// The terminal outcome is known; teardown is running.
    Completing,
    /// The outcome has been forwarded.
    Done,
}

impl ExecutionState {
    /// Validate a transition and return the new state.
    pub fn transition(self, next: ExecutionState) -> Result<ExecutionState> {
        use ExecutionState::*;
        let legal = matches!(
            (self, next),
            (Created, SetupDone)
                | (Created, Completing)
                | (Created, Done)
                | (SetupDone, BodyRunning)
                | (SetupDone, Completing)
                | (BodyRunning, Completing)
                | (Completing, Done)
        );
        if legal {
            Ok(next)
        } else {
            Err(Error::InvalidTransition { from: self, to: next })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ExecutionState::Done
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Created => "created",
            ExecutionState::SetupDone => "setup-done",
            ExecutionState::BodyRunning => "body-running",
            ExecutionState::Completing => "completing",
            ExecutionState::Done => "done",
        };
        f.write_str(name)
    }
}

/// One run of a wrapper around a body.
///
/// The execution is the single writer of its own state; observers follow
/// it through [`ExecutionHandle::state`].
pub struct Execution<T> {
    wrapper: Arc<dyn Wrapper>,
    body: Arc<dyn BodyInvoker<T>>,
    resources: StepResources,
    ambient: EnvVars,
    config: StepConfig,
    cancel: CancelHandle,
    state: watch::Sender<ExecutionState>,
}

impl<T: Send + 'static> Execution<T> {
    /// Create an execution. `ambient` is snapshotted here and never re-read.
    pub fn new(
        wrapper: Arc<dyn Wrapper>,
        body: Arc<dyn BodyInvoker<T>>,
        resources: StepResources,
        ambient: EnvVars,
    ) -> Self {
        let (state, _) = watch::channel(ExecutionState::Created);
        Self {
            wrapper,
            body,
            resources,
            ambient,
            config: StepConfig::default(),
            cancel: CancelHandle::new(),
            state,
        }
    }

    pub fn with_config(mut self, config: StepConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing cancellation handle, e.g. one from an enclosing body.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ExecutionState {
        *self.state.borrow()
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Begin the lifecycle on the current tokio runtime and return at once.
    ///
    /// Fails with [`Error::Dispatch`] outside a tokio runtime.
    pub fn start(self) -> Result<ExecutionHandle<T>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Dispatch(format!("no tokio runtime: {}", e)))?;
        let state = self.state.subscribe();
        let cancel = self.cancel.clone();
        let task = runtime.spawn(self.run());
        Ok(ExecutionHandle {
            task,
            state,
            cancel,
        })
    }

    /// Drive the whole lifecycle to completion on the current task.
    pub async fn run(self) -> Result<T> {
        let span = tracing::info_span!(
            "wrap",
            step = %self.wrapper.name(),
            run = %self.resources.run,
        );
        self.drive().instrument(span).await
    }

    async fn drive(self) -> Result<T> {
        let mut ctx = SetupContext::new();
        // Building the future runs wrapper code too, so it happens inside the guard.
        let setup = AssertUnwindSafe(async {
            self.wrapper
                .set_up(&mut ctx, &self.resources, &self.ambient)
                .await
        })
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(callback::panic_cause("setup", panic)));
        let (overlay, disposer) = ctx.into_parts();

        if let Err(source) = setup {
            return self.fail_setup(source, disposer).await;
        }
        self.advance(ExecutionState::SetupDone);

        let merged = overlay.map(|overlay| self.ambient.overlay(&overlay));
        if let Some(env) = &merged {
            tracing::debug!(env = %env, "body environment");
        }
        let invocation = BodyInvocation::new(
            self.ambient.clone(),
            merged,
            self.resources.clone(),
            self.cancel.clone(),
        );

        let (observer, rx) = CompletionObserver::channel();
        let dispatched = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.body.dispatch(invocation, observer)
        }));
        let outcome = match dispatched {
            Ok(Ok(())) => {
                self.advance(ExecutionState::BodyRunning);
                tracing::info!("body dispatched");
                rx.await
                    .unwrap_or_else(|_| Err(Box::new(Error::Abandoned) as BoxError))
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "body dispatch failed");
                Err(Box::new(e) as BoxError)
            }
            Err(panic) => {
                let cause = callback::panic_cause("body dispatch", panic);
                tracing::warn!(error = %cause, "body dispatch failed");
                Err(cause)
            }
        };

        self.advance(ExecutionState::Completing);
        let result =
            callback::complete(outcome, disposer, &self.resources, self.config.teardown_timeout)
                .await;
        self.finish(&result);
        result
    }

    async fn fail_setup(
        &self,
        source: BoxError,
        disposer: Option<Box<dyn Disposer>>,
    ) -> Result<T> {
        tracing::warn!(error = %source, "setup failed");
        let teardown = match disposer {
            Some(disposer) => {
                self.advance(ExecutionState::Completing);
                callback::tear_down(disposer, &self.resources, self.config.teardown_timeout)
                    .await
                    .err()
            }
            None => None,
        };
        let result = Err(Error::Setup {
            step: self.wrapper.name().to_string(),
            source,
            teardown,
        });
        self.finish(&result);
        result
    }

    fn finish(&self, result: &Result<T>) {
        self.advance(ExecutionState::Done);
        match result {
            Ok(_) => tracing::info!("execution succeeded"),
            Err(e) => tracing::info!(kind = e.kind(), error = %e, "execution failed"),
        }
    }

    fn advance(&self, next: ExecutionState) {
        let current = self.state();
        let checked = current.transition(next);
        match &checked {
            Ok(_) => tracing::debug!(from = %current, to = %next, "state transition"),
            Err(e) => tracing::error!(error = %e, "unexpected transition"),
        }
        debug_assert!(checked.is_ok(), "illegal transition {} -> {}", current, next);
        self.state.send_replace(next);
    }
}

/// Handle to an execution started with [`Execution::start`].
pub struct ExecutionHandle<T> {
    task: JoinHandle<Result<T>>,
    state: watch::Receiver<ExecutionState>,
    cancel: CancelHandle,
}

impl<T> ExecutionHandle<T> {
    /// The most recently published state.
    pub fn state(&self) -> ExecutionState {
        *self.state.borrow()
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Ask the body to stop.
    ///
    /// The request is forwarded to the body only; teardown still runs on
    /// the normal completion path once the body reports.
    pub fn stop(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    /// A clone of the handle `stop` signals, for use from other tasks.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait until the execution reaches `target` (or finishes).
    pub async fn wait_for(&mut self, target: ExecutionState) -> ExecutionState {
        let reached = self
            .state
            .wait_for(|s| *s == target || s.is_terminal())
            .await
            .map(|s| *s);
        reached.unwrap_or(ExecutionState::Done)
    }

    /// Wait for the forwarded outcome.
    pub async fn join(self) -> Result<T> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Dispatch(format!("execution task failed: {}", e))),
        }
    }
}

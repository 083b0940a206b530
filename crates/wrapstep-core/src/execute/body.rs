//! Body dispatch contract and the terminal-outcome channel.

use std::future::Future;
use std::marker::PhantomData;

use tokio::sync::oneshot;

use crate::env::EnvVars;
use crate::error::{BoxError, Error, Result};
use crate::resources::StepResources;

use super::context::CancelHandle;

/// Terminal outcome of a body: a success value or a failure cause.
pub type Outcome<T> = std::result::Result<T, BoxError>;

/// Single-fire observer of a body's terminal outcome.
///
/// Every reporting method consumes the observer, so a body can report at
/// most once. Dropping it without reporting marks the body as abandoned.
pub struct CompletionObserver<T> {
    tx: oneshot::Sender<Outcome<T>>,
}

impl<T> CompletionObserver<T> {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Outcome<T>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Report success.
    pub fn on_success(self, value: T) {
        self.complete(Ok(value));
    }

    /// Report failure.
    pub fn on_failure(self, cause: impl Into<BoxError>) {
        self.complete(Err(cause.into()));
    }

    /// Report an outcome.
    pub fn complete(self, outcome: Outcome<T>) {
        if self.tx.send(outcome).is_err() {
            tracing::debug!("execution dropped before the body reported");
        }
    }
}

/// What a body is given when it is dispatched.
#[derive(Debug, Clone)]
pub struct BodyInvocation {
    ambient: EnvVars,
    merged: Option<EnvVars>,
    resources: StepResources,
    cancel: CancelHandle,
}

impl BodyInvocation {
    pub(crate) fn new(
        ambient: EnvVars,
        merged: Option<EnvVars>,
        resources: StepResources,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            ambient,
            merged,
            resources,
            cancel,
        }
    }

    /// The merged environment, if the wrapper supplied an overlay.
    pub fn merged_env(&self) -> Option<&EnvVars> {
        self.merged.as_ref()
    }

    /// The environment the body should run under.
    pub fn env(&self) -> &EnvVars {
        self.merged.as_ref().unwrap_or(&self.ambient)
    }

    pub fn resources(&self) -> &StepResources {
        &self.resources
    }

    /// Cancellation requests from the outer scheduler arrive here.
    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }
}

/// Service that runs bodies on behalf of an execution.
pub trait BodyInvoker<T>: Send + Sync {
    /// Start the body and return without waiting for it.
    ///
    /// The observer must be fired exactly once, later, with the body's
    /// terminal outcome. If `Err` is returned the body was not started and
    /// the observer must not have been fired.
    fn dispatch(&self, invocation: BodyInvocation, observer: CompletionObserver<T>) -> Result<()>;
}

/// Body invoker backed by an async closure spawned on the current tokio
/// runtime.
///
/// A cancellation request drops the closure's future and reports
/// [`Error::Cancelled`].
pub struct FnBody<T, F> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F, Fut> FnBody<T, F>
where
    F: Fn(BodyInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
    T: Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<T, F, Fut> BodyInvoker<T> for FnBody<T, F>
where
    F: Fn(BodyInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
    T: Send + 'static,
{
    fn dispatch(&self, invocation: BodyInvocation, observer: CompletionObserver<T>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Dispatch(format!("no tokio runtime: {}", e)))?;
        let cancel = invocation.cancel_handle().clone();
        let body = (self.f)(invocation);

        runtime.spawn(async move {
            let outcome = tokio::select! {
                outcome = body => outcome,
                reason = cancel.cancelled() => Err(Box::new(Error::Cancelled(reason)) as BoxError),
            };
            observer.complete(outcome);
        });
        Ok(())
    }
}

//! Completion callback: tear down, then forward the body's outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use crate::error::{BoxError, Error, Result};
use crate::resources::StepResources;
use crate::wrapper::Disposer;

use super::body::Outcome;

/// Run teardown (if a disposer was registered) and combine its result with
/// the body's outcome.
///
/// Teardown failures never escape as faults: they become part of the
/// returned error. A body failure always stays the primary cause.
pub(crate) async fn complete<T>(
    outcome: Outcome<T>,
    disposer: Option<Box<dyn Disposer>>,
    resources: &StepResources,
    timeout: Option<Duration>,
) -> Result<T> {
    let teardown = match disposer {
        Some(disposer) => tear_down(disposer, resources, timeout).await,
        None => Ok(()),
    };
    forward(outcome, teardown)
}

/// Invoke the disposer once, converting errors, timeouts and panics into a
/// failure cause.
pub(crate) async fn tear_down(
    disposer: Box<dyn Disposer>,
    resources: &StepResources,
    timeout: Option<Duration>,
) -> std::result::Result<(), BoxError> {
    // Building the future runs disposer code too, so it happens inside the guard.
    let teardown =
        AssertUnwindSafe(async move { disposer.tear_down(resources).await }).catch_unwind();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, teardown).await {
            Ok(result) => result,
            Err(_) => Ok(Err(Box::new(Error::TeardownTimeout(limit)) as BoxError)),
        },
        None => teardown.await,
    };

    let result = result.unwrap_or_else(|panic| Err(panic_cause("teardown", panic)));
    if let Err(e) = &result {
        tracing::warn!(error = %e, "teardown failed");
        resources.listener.error(&format!("teardown failed: {}", e));
    }
    result
}

fn forward<T>(outcome: Outcome<T>, teardown: std::result::Result<(), BoxError>) -> Result<T> {
    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(teardown)) => Err(Error::Teardown { source: teardown }),
        (Err(cause), Ok(())) => Err(Error::Body { source: cause }),
        (Err(cause), Err(teardown)) => Err(Error::BodyAndTeardown {
            source: cause,
            teardown,
        }),
    }
}

/// Turn a caught panic payload into a failure cause.
pub(crate) fn panic_cause(what: &str, panic: Box<dyn Any + Send>) -> BoxError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("{} panicked: {}", what, message).into()
}

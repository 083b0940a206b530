//! Error types for wrapstep-core.

use std::time::Duration;

use thiserror::Error;

use crate::execute::ExecutionState;

/// Result type for wrapstep-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure cause raised by a collaborator (wrapper, body or disposer).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in wrapstep-core.
///
/// The lifecycle variants keep the failure kinds apart so callers can tell
/// whether the body ever ran and whether cleanup succeeded.
#[derive(Debug, Error)]
pub enum Error {
    /// The wrapper's setup failed; the body was never dispatched.
    ///
    /// `teardown` is set when setup registered a disposer before failing
    /// and tearing that disposer down failed as well.
    #[error("setup of `{step}` failed: {source}{}", partial_teardown(.teardown))]
    Setup {
        step: String,
        source: BoxError,
        teardown: Option<BoxError>,
    },

    /// The body failed; teardown (if any) succeeded.
    #[error("body failed: {source}")]
    Body { source: BoxError },

    /// The body failed and teardown failed too. The body cause stays primary.
    #[error("body failed: {source} (teardown also failed: {teardown})")]
    BodyAndTeardown { source: BoxError, teardown: BoxError },

    /// The body succeeded but teardown failed.
    #[error("body succeeded but teardown failed: {source}")]
    Teardown { source: BoxError },

    /// Setup tried to register a second disposer.
    #[error("a disposer is already registered")]
    DuplicateDisposer,

    /// The dispatcher dropped the completion observer without reporting.
    #[error("body was abandoned before reporting an outcome")]
    Abandoned,

    /// The body honored a cancellation request.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Teardown did not finish within the configured timeout.
    #[error("teardown timed out after {0:?}")]
    TeardownTimeout(Duration),

    /// The state machine was asked to make an illegal transition.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ExecutionState,
        to: ExecutionState,
    },

    /// The body dispatch service could not accept the body.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

fn partial_teardown(teardown: &Option<BoxError>) -> String {
    match teardown {
        Some(t) => format!(" (teardown of partial setup also failed: {})", t),
        None => String::new(),
    }
}

impl Error {
    /// Whether setup failed before the body was dispatched.
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Error::Setup { .. })
    }

    /// The body's own failure cause, if the body ran and failed.
    pub fn body_cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Body { source } | Error::BodyAndTeardown { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// The teardown failure, if cleanup failed on any path.
    pub fn teardown_cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Teardown { source } => Some(source.as_ref()),
            Error::BodyAndTeardown { teardown, .. } => Some(teardown.as_ref()),
            Error::Setup {
                teardown: Some(t), ..
            } => Some(t.as_ref()),
            _ => None,
        }
    }

    /// Whether this outcome stems from a cancellation of the body.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Error::Cancelled(_) => true,
            Error::Body { source } | Error::BodyAndTeardown { source, .. } => source
                .downcast_ref::<Error>()
                .is_some_and(Error::is_cancellation),
            _ => false,
        }
    }

    /// Short label for the failure kind, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Setup { .. } => "setup",
            Error::Body { .. } => "body",
            Error::BodyAndTeardown { .. } => "body+teardown",
            Error::Teardown { .. } | Error::TeardownTimeout(_) => "teardown",
            Error::DuplicateDisposer => "setup",
            Error::Abandoned => "abandoned",
            Error::Cancelled(_) => "cancelled",
            Error::InvalidTransition { .. } => "internal",
            Error::Dispatch(_) => "dispatch",
            Error::Io(_) => "io",
            Error::Config(_) => "config",
        }
    }
}

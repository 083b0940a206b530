//! The wrapper contract: setup, the context it fills in, and its disposer.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;

use crate::env::EnvVars;
use crate::error::{BoxError, Error, Result};
use crate::resources::StepResources;

/// Prepares environment and resources before a body runs.
///
/// Implementations record what they established in the [`SetupContext`]:
/// environment bindings for the body, and a [`Disposer`] if anything must
/// be undone afterwards.
pub trait Wrapper: Send + Sync {
    /// Stable name used in logs and error messages.
    fn name(&self) -> &str;

    /// Prepare the environment.
    ///
    /// `env` is the ambient environment snapshot. A disposer registered
    /// before an error is returned is still torn down.
    fn set_up<'a>(
        &'a self,
        ctx: &'a mut SetupContext,
        resources: &'a StepResources,
        env: &'a EnvVars,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>>;
}

/// Undoes whatever a wrapper's setup established.
pub trait Disposer: Send + Sync {
    /// Tear down. Consumes the disposer, so it can run at most once.
    fn tear_down<'a>(
        self: Box<Self>,
        resources: &'a StepResources,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>>;
}

/// Adapts a closure into a [`Disposer`].
///
/// The closure receives its own clone of the resources.
pub struct FnDisposer<F> {
    f: F,
}

impl<F, Fut> FnDisposer<F>
where
    F: FnOnce(StepResources) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Disposer for FnDisposer<F>
where
    F: FnOnce(StepResources) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    fn tear_down<'a>(
        self: Box<Self>,
        resources: &'a StepResources,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>> {
        Box::pin((self.f)(resources.clone()))
    }
}

/// What a wrapper's setup produced.
///
/// Both parts are optional: no overlay means the body runs under the
/// unmodified ambient environment, no disposer means there is nothing to
/// tear down.
#[derive(Default)]
pub struct SetupContext {
    env: Option<EnvVars>,
    disposer: Option<Box<dyn Disposer>>,
}

impl SetupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one variable in the overlay, creating the overlay if needed.
    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.get_or_insert_with(EnvVars::new).insert(key, value);
    }

    /// Merge a whole set of bindings into the overlay.
    pub fn set_env(&mut self, overlay: EnvVars) {
        match &mut self.env {
            Some(existing) => *existing = existing.overlay(&overlay),
            None => self.env = Some(overlay),
        }
    }

    /// Register the disposer. Only one may be registered.
    pub fn set_disposer(&mut self, disposer: impl Disposer + 'static) -> Result<()> {
        if self.disposer.is_some() {
            return Err(Error::DuplicateDisposer);
        }
        self.disposer = Some(Box::new(disposer));
        Ok(())
    }

    /// The overlay recorded so far.
    pub fn overlay(&self) -> Option<&EnvVars> {
        self.env.as_ref()
    }

    pub fn has_disposer(&self) -> bool {
        self.disposer.is_some()
    }

    pub(crate) fn into_parts(self) -> (Option<EnvVars>, Option<Box<dyn Disposer>>) {
        (self.env, self.disposer)
    }
}

impl fmt::Debug for SetupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupContext")
            .field("env", &self.env)
            .field("has_disposer", &self.has_disposer())
            .finish()
    }
}

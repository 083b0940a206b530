//! The `wrap` step: a wrapper plus the metadata that describes it.

use std::sync::Arc;

use serde::Serialize;

use crate::config::StepConfig;
use crate::env::EnvVars;
use crate::error::{BoxError, Error, Result};
use crate::execute::{
    BodyInvocation, BodyInvoker, CompletionObserver, Execution, ExecutionHandle,
};
use crate::resources::StepResources;
use crate::wrapper::Wrapper;

/// Declarative metadata for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepDescriptor {
    /// Stable identifier used by scripts that invoke the step.
    pub function_name: &'static str,
    /// Human-readable name.
    pub display_name: &'static str,
    /// Whether the step needs a nested block supplied by its caller.
    pub takes_implicit_block_argument: bool,
}

/// Runs a [`Wrapper`] around a caller-supplied body.
#[derive(Clone)]
pub struct WrapperStep {
    delegate: Arc<dyn Wrapper>,
    config: StepConfig,
}

impl WrapperStep {
    pub const DESCRIPTOR: StepDescriptor = StepDescriptor {
        function_name: "wrap",
        display_name: "Use a wrapper around a block of work",
        takes_implicit_block_argument: true,
    };

    pub fn new(delegate: impl Wrapper + 'static) -> Self {
        Self::from_arc(Arc::new(delegate))
    }

    pub fn from_arc(delegate: Arc<dyn Wrapper>) -> Self {
        Self {
            delegate,
            config: StepConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StepConfig) -> Self {
        self.config = config;
        self
    }

    pub fn delegate(&self) -> &Arc<dyn Wrapper> {
        &self.delegate
    }

    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &'static StepDescriptor {
        &Self::DESCRIPTOR
    }

    /// Build an execution without starting it.
    pub fn execution<T: Send + 'static>(
        &self,
        resources: StepResources,
        ambient: EnvVars,
        body: Arc<dyn BodyInvoker<T>>,
    ) -> Execution<T> {
        Execution::new(self.delegate.clone(), body, resources, ambient)
            .with_config(self.config.clone())
    }

    /// Start an execution on the current tokio runtime.
    pub fn start<T: Send + 'static>(
        &self,
        resources: StepResources,
        ambient: EnvVars,
        body: Arc<dyn BodyInvoker<T>>,
    ) -> Result<ExecutionHandle<T>> {
        self.execution(resources, ambient, body).start()
    }

    /// Use this step as the body of an enclosing step, running `inner`
    /// inside it.
    pub fn around<T: Send + 'static>(self, inner: Arc<dyn BodyInvoker<T>>) -> NestedStep<T> {
        NestedStep { step: self, inner }
    }
}

impl std::fmt::Debug for WrapperStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperStep")
            .field("delegate", &self.delegate.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Body invoker that runs a whole [`WrapperStep`] as the body of an
/// enclosing execution.
///
/// The nested step sees the enclosing body environment as its ambient
/// environment and shares the enclosing cancellation handle, so wrappers
/// compose and teardown runs innermost first.
pub struct NestedStep<T> {
    step: WrapperStep,
    inner: Arc<dyn BodyInvoker<T>>,
}

impl<T: Send + 'static> BodyInvoker<T> for NestedStep<T> {
    fn dispatch(&self, invocation: BodyInvocation, observer: CompletionObserver<T>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Dispatch(format!("no tokio runtime: {}", e)))?;
        let execution = self
            .step
            .execution(
                invocation.resources().clone(),
                invocation.env().clone(),
                self.inner.clone(),
            )
            .with_cancel_handle(invocation.cancel_handle().clone());

        runtime.spawn(async move {
            let result = execution.run().await;
            observer.complete(result.map_err(|e| Box::new(e) as BoxError));
        });
        Ok(())
    }
}

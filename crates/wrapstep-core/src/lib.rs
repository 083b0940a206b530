//! Core engine for wrapstep.
//!
//! Runs a reusable *wrapper* around a nested block of work (the *body*):
//! - Asynchronous setup producing an environment overlay and an optional disposer
//! - Snapshot-then-overlay environment merge
//! - Non-blocking body dispatch with a single-fire completion channel
//! - Exactly-once teardown that forwards, never swallows, the body's outcome

pub mod config;
pub mod env;
pub mod error;
pub mod execute;
pub mod resources;
pub mod step;
pub mod wrapper;

pub use config::StepConfig;
pub use env::EnvVars;
pub use error::{BoxError, Error, Result};
pub use execute::{
    BodyInvocation, BodyInvoker, CancelHandle, CompletionObserver, Execution, ExecutionHandle,
    ExecutionState, FnBody, Outcome,
};
pub use resources::{
    Launcher, LocalLauncher, MemoryListener, ProcessSpec, RunHandle, StepResources, TaskListener,
    TracingListener, Workspace,
};
pub use step::{NestedStep, StepDescriptor, WrapperStep};
pub use wrapper::{Disposer, FnDisposer, SetupContext, Wrapper};

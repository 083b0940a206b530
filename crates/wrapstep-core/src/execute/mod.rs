//! Execution engine for wrapper steps.
//!
//! Drives one wrapper around one body, from setup to forwarding the
//! terminal outcome.
//!
//! # Lifecycle
//!
//! ```text
//! Execution::start()  (returns immediately)
//!     │
//!     ├── Created ──► Wrapper::set_up(ctx, resources, ambient env)
//!     │                   │
//!     │                   ├── failure ──► [tear down partial disposer] ──► Done (Error::Setup)
//!     │                   │
//!     ├── SetupDone ──► merge overlay onto ambient snapshot
//!     │                   │
//!     ├── BodyRunning ──► BodyInvoker::dispatch(invocation, observer)
//!     │                   │       (body runs elsewhere, fires observer once)
//!     │                   │
//!     ├── Completing ──► completion callback: tear down, combine outcomes
//!     │
//!     └── Done ──► ExecutionHandle::join() yields the forwarded outcome
//! ```
//!
//! # Module Structure
//!
//! - `context` - Cooperative cancellation handle shared with the body
//! - `body` - Body dispatch contract and the single-fire completion observer
//! - `callback` - Teardown and outcome forwarding
//! - `execution` - The state machine and its handle

mod body;
mod callback;
mod context;
mod execution;

pub use body::{BodyInvocation, BodyInvoker, CompletionObserver, FnBody, Outcome};
pub use context::CancelHandle;
pub use execution::{Execution, ExecutionHandle, ExecutionState};

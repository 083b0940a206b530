//! Cooperative cancellation shared between an execution and its body.

use std::sync::Arc;

use tokio::sync::watch;

/// Handle for cooperative cancellation of a running body.
///
/// `CancelHandle` can be cloned and shared across tasks; any clone can
/// request cancellation and all other clones observe it. The execution that
/// owns the handle takes no action of its own when cancelled: it is up to
/// the body to notice and finish with a cancellation failure.
///
/// # Example
///
/// ```
/// use wrapstep_core::execute::CancelHandle;
///
/// let handle = CancelHandle::new();
/// let clone = handle.clone();
///
/// assert!(!handle.is_cancelled());
/// clone.cancel("user interrupt");
///
/// assert!(handle.is_cancelled());
/// assert_eq!(handle.reason().as_deref(), Some("user interrupt"));
/// ```
#[derive(Clone)]
pub struct CancelHandle {
    /// `None` until cancelled, then the first reason given.
    reason: Arc<watch::Sender<Option<String>>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Create a new, uncancelled handle.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            reason: Arc::new(tx),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.reason.borrow().is_some()
    }

    /// The reason given to the first `cancel` call.
    pub fn reason(&self) -> Option<String> {
        self.reason.borrow().clone()
    }

    /// Request cancellation. Later requests keep the first reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let first = self.reason.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if first {
            tracing::debug!("cancellation requested");
        }
    }

    /// Wait until cancellation is requested and return the reason.
    pub async fn cancelled(&self) -> String {
        let mut rx = self.reason.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or_default(),
            Err(_) => String::new(),
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("reason", &*self.reason.borrow())
            .finish()
    }
}

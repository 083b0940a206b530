//! Integration tests for the wrapper lifecycle.
//!
//! Covers setup, body dispatch, teardown and outcome forwarding end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use wrapstep_core::{
    BodyInvocation, BodyInvoker, BoxError, CompletionObserver, EnvVars, Error, ExecutionState,
    FnBody, FnDisposer, MemoryListener, Outcome, RunHandle, SetupContext, StepConfig,
    StepResources, Workspace, Wrapper, WrapperStep,
};

// =============================================================================
// Test Helpers
// =============================================================================

type Journal = Arc<Mutex<Vec<String>>>;

fn env(pairs: &[(&str, &str)]) -> EnvVars {
    pairs.iter().copied().collect()
}

fn resources() -> (StepResources, Arc<MemoryListener>) {
    let listener = Arc::new(MemoryListener::new());
    let resources = StepResources::new(RunHandle::new("lifecycle"), Workspace::new("/tmp"))
        .with_listener(listener.clone());
    (resources, listener)
}

fn record(journal: &Journal, entry: &str) {
    journal.lock().unwrap().push(entry.to_string());
}

/// How the test disposer behaves.
#[derive(Clone, Copy)]
enum Teardown {
    Ok,
    Fail(&'static str),
}

/// Wrapper whose behavior is scripted per test.
#[derive(Clone)]
struct ScriptedWrapper {
    overlay: Option<EnvVars>,
    teardown: Option<Teardown>,
    setup_error: Option<&'static str>,
    teardown_calls: Arc<AtomicUsize>,
    journal: Journal,
}

impl ScriptedWrapper {
    fn new(journal: &Journal) -> Self {
        Self {
            overlay: None,
            teardown: None,
            setup_error: None,
            teardown_calls: Arc::new(AtomicUsize::new(0)),
            journal: journal.clone(),
        }
    }

    fn overlay(mut self, overlay: EnvVars) -> Self {
        self.overlay = Some(overlay);
        self
    }

    fn disposer(mut self, teardown: Teardown) -> Self {
        self.teardown = Some(teardown);
        self
    }

    fn failing_setup(mut self, message: &'static str) -> Self {
        self.setup_error = Some(message);
        self
    }

    fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::SeqCst)
    }
}

impl Wrapper for ScriptedWrapper {
    fn name(&self) -> &str {
        "scripted"
    }

    fn set_up<'a>(
        &'a self,
        ctx: &'a mut SetupContext,
        _resources: &'a StepResources,
        _env: &'a EnvVars,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>> {
        Box::pin(async move {
            record(&self.journal, "setup");
            if let Some(overlay) = &self.overlay {
                ctx.set_env(overlay.clone());
            }
            if let Some(teardown) = self.teardown {
                let calls = self.teardown_calls.clone();
                let journal = self.journal.clone();
                ctx.set_disposer(FnDisposer::new(move |_resources| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    record(&journal, "teardown");
                    match teardown {
                        Teardown::Ok => Ok(()),
                        Teardown::Fail(msg) => Err(BoxError::from(msg)),
                    }
                }))?;
            }
            match self.setup_error {
                Some(msg) => Err(msg.into()),
                None => Ok(()),
            }
        })
    }
}

/// Body that records how often it was dispatched and what it saw.
struct RecordingBody<T> {
    dispatches: Arc<AtomicUsize>,
    seen_env: Arc<Mutex<Option<EnvVars>>>,
    journal: Journal,
    outcome: fn() -> Outcome<T>,
}

impl<T> RecordingBody<T> {
    fn new(journal: &Journal, outcome: fn() -> Outcome<T>) -> Self {
        Self {
            dispatches: Arc::new(AtomicUsize::new(0)),
            seen_env: Arc::new(Mutex::new(None)),
            journal: journal.clone(),
            outcome,
        }
    }
}

impl<T: Send + 'static> BodyInvoker<T> for RecordingBody<T> {
    fn dispatch(
        &self,
        invocation: BodyInvocation,
        observer: CompletionObserver<T>,
    ) -> wrapstep_core::Result<()> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        *self.seen_env.lock().unwrap() = Some(invocation.env().clone());
        let journal = self.journal.clone();
        let outcome = self.outcome;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            record(&journal, "body");
            observer.complete(outcome());
        });
        Ok(())
    }
}

// =============================================================================
// Outcome forwarding
// =============================================================================

#[tokio::test]
async fn test_success_with_disposer_tears_down_once() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Ok);
    let body = Arc::new(RecordingBody::new(&journal, || Ok(42)));
    let (res, _) = resources();

    let handle = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), body.clone())
        .unwrap();
    let value = handle.join().await.unwrap();

    assert_eq!(value, 42);
    assert_eq!(wrapper.teardown_calls(), 1);
    assert_eq!(body.dispatches.load(Ordering::SeqCst), 1);
    assert_eq!(*journal.lock().unwrap(), vec!["setup", "body", "teardown"]);
}

#[tokio::test]
async fn test_body_failure_survives_clean_teardown() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Ok);
    let body = Arc::new(RecordingBody::<()>::new(&journal, || Err("boom".into())));
    let (res, _) = resources();

    let err = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), body)
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Body { .. }));
    assert_eq!(err.body_cause().unwrap().to_string(), "boom");
    assert_eq!(wrapper.teardown_calls(), 1);
}

#[tokio::test]
async fn test_teardown_failure_after_success_is_reported() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Fail("locked"));
    let body = Arc::new(RecordingBody::new(&journal, || Ok("done")));
    let (res, listener) = resources();

    let err = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), body)
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Teardown { .. }));
    assert_eq!(err.teardown_cause().unwrap().to_string(), "locked");
    assert!(err.body_cause().is_none());
    assert_eq!(listener.lines(), vec!["ERROR: teardown failed: locked"]);
}

#[tokio::test]
async fn test_teardown_failure_after_body_failure_keeps_both() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Fail("locked"));
    let body = Arc::new(RecordingBody::<()>::new(&journal, || Err("boom".into())));
    let (res, _) = resources();

    let err = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), body)
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "body+teardown");
    assert_eq!(err.body_cause().unwrap().to_string(), "boom");
    assert_eq!(err.teardown_cause().unwrap().to_string(), "locked");
    assert_eq!(wrapper.teardown_calls(), 1);
}

// =============================================================================
// Setup failures
// =============================================================================

#[tokio::test]
async fn test_setup_failure_never_dispatches_body() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).failing_setup("no tool");
    let body = Arc::new(RecordingBody::new(&journal, || Ok(1)));
    let (res, _) = resources();

    let err = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), body.clone())
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert!(err.is_setup_failure());
    assert_eq!(err.to_string(), "setup of `scripted` failed: no tool");
    assert_eq!(body.dispatches.load(Ordering::SeqCst), 0);
    assert_eq!(wrapper.teardown_calls(), 0);
    assert_eq!(*journal.lock().unwrap(), vec!["setup"]);
}

#[tokio::test]
async fn test_setup_failure_tears_down_partial_disposer() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal)
        .disposer(Teardown::Ok)
        .failing_setup("half done");
    let body = Arc::new(RecordingBody::new(&journal, || Ok(1)));
    let (res, _) = resources();

    let err = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), body.clone())
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert!(err.is_setup_failure());
    assert!(err.teardown_cause().is_none());
    assert_eq!(body.dispatches.load(Ordering::SeqCst), 0);
    assert_eq!(wrapper.teardown_calls(), 1);
}

#[tokio::test]
async fn test_setup_failure_with_failing_partial_teardown() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal)
        .disposer(Teardown::Fail("stuck"))
        .failing_setup("half done");
    let body = Arc::new(RecordingBody::new(&journal, || Ok(1)));
    let (res, _) = resources();

    let err = WrapperStep::new(wrapper)
        .start(res, EnvVars::new(), body)
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert!(err.is_setup_failure());
    assert_eq!(err.teardown_cause().unwrap().to_string(), "stuck");
    assert!(err.to_string().contains("half done"));
}

// =============================================================================
// Environment
// =============================================================================

#[tokio::test]
async fn test_overlay_scenario() {
    let journal = Journal::default();
    let wrapper =
        ScriptedWrapper::new(&journal).overlay(env(&[("TOOL_HOME", "/opt/tool")]));
    let body = Arc::new(RecordingBody::new(&journal, || Ok(42)));
    let (res, _) = resources();

    let value = WrapperStep::new(wrapper)
        .start(res, env(&[("PATH", "/usr/bin")]), body.clone())
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(
        body.seen_env.lock().unwrap().clone().unwrap(),
        env(&[("PATH", "/usr/bin"), ("TOOL_HOME", "/opt/tool")])
    );
}

#[tokio::test]
async fn test_no_overlay_runs_under_ambient() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal);
    let ambient = env(&[("A", "0"), ("B", "2")]);
    let seen = Arc::new(Mutex::new(None));
    let body = {
        let seen = seen.clone();
        Arc::new(FnBody::new(move |inv: BodyInvocation| {
            *seen.lock().unwrap() = Some((inv.merged_env().is_some(), inv.env().clone()));
            async { Ok::<_, BoxError>(()) }
        }))
    };
    let (res, _) = resources();

    WrapperStep::new(wrapper)
        .start(res, ambient.clone(), body)
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().clone().unwrap(), (false, ambient));
}

#[tokio::test]
async fn test_overlay_wins_on_collision() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).overlay(env(&[("A", "1")]));
    let body = Arc::new(RecordingBody::new(&journal, || Ok(())));
    let (res, _) = resources();

    WrapperStep::new(wrapper)
        .start(res, env(&[("A", "0"), ("B", "2")]), body.clone())
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(
        body.seen_env.lock().unwrap().clone().unwrap(),
        env(&[("A", "1"), ("B", "2")])
    );
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_start_returns_before_body_completes() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Ok);
    let release = Arc::new(tokio::sync::Notify::new());
    let body = {
        let release = release.clone();
        Arc::new(FnBody::new(move |_inv: BodyInvocation| {
            let release = release.clone();
            async move {
                release.notified().await;
                Ok::<_, BoxError>("released")
            }
        }))
    };
    let (res, _) = resources();

    let mut handle = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), body)
        .unwrap();
    assert_eq!(
        handle.wait_for(ExecutionState::BodyRunning).await,
        ExecutionState::BodyRunning
    );
    assert!(!handle.is_done());
    assert_eq!(wrapper.teardown_calls(), 0);

    release.notify_one();
    assert_eq!(handle.join().await.unwrap(), "released");
    assert_eq!(wrapper.teardown_calls(), 1);
}

#[tokio::test]
async fn test_stop_cancels_body_and_still_tears_down() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Ok);
    let body = Arc::new(FnBody::new(|_inv: BodyInvocation| async {
        futures::future::pending::<Outcome<()>>().await
    }));
    let (res, _) = resources();

    let mut handle = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), body)
        .unwrap();
    handle.wait_for(ExecutionState::BodyRunning).await;
    handle.stop("user abort");

    let err = handle.join().await.unwrap_err();
    assert!(err.is_cancellation());
    assert!(matches!(err, Error::Body { .. }));
    assert_eq!(wrapper.teardown_calls(), 1);
}

/// Dispatcher that drops the observer without ever reporting.
struct AbandoningBody;

impl BodyInvoker<()> for AbandoningBody {
    fn dispatch(
        &self,
        _invocation: BodyInvocation,
        observer: CompletionObserver<()>,
    ) -> wrapstep_core::Result<()> {
        drop(observer);
        Ok(())
    }
}

#[tokio::test]
async fn test_abandoned_body_still_tears_down() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Ok);
    let (res, _) = resources();

    let err = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), Arc::new(AbandoningBody))
        .unwrap()
        .join()
        .await
        .unwrap_err();

    let cause = err.body_cause().unwrap();
    assert!(matches!(cause.downcast_ref::<Error>(), Some(Error::Abandoned)));
    assert_eq!(wrapper.teardown_calls(), 1);
}

/// Dispatcher that refuses every body.
struct RefusingBody;

impl BodyInvoker<()> for RefusingBody {
    fn dispatch(
        &self,
        _invocation: BodyInvocation,
        _observer: CompletionObserver<()>,
    ) -> wrapstep_core::Result<()> {
        Err(Error::Dispatch("queue full".to_string()))
    }
}

#[tokio::test]
async fn test_refused_dispatch_still_tears_down() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Ok);
    let (res, _) = resources();

    let err = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), Arc::new(RefusingBody))
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert_eq!(
        err.body_cause().unwrap().to_string(),
        "dispatch error: queue full"
    );
    assert_eq!(wrapper.teardown_calls(), 1);
}

#[tokio::test]
async fn test_teardown_timeout_is_a_teardown_failure() {
    let journal = Journal::default();
    let wrapper = HangingTeardown;
    let body = Arc::new(RecordingBody::new(&journal, || Ok(())));
    let (res, _) = resources();
    let config = StepConfig::default().with_teardown_timeout(Duration::from_millis(20));

    let err = WrapperStep::new(wrapper)
        .with_config(config)
        .start(res, EnvVars::new(), body)
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Teardown { .. }));
    assert!(err.to_string().contains("timed out"));
}

/// Wrapper whose disposer never finishes.
struct HangingTeardown;

impl Wrapper for HangingTeardown {
    fn name(&self) -> &str {
        "hanging"
    }

    fn set_up<'a>(
        &'a self,
        ctx: &'a mut SetupContext,
        _resources: &'a StepResources,
        _env: &'a EnvVars,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>> {
        Box::pin(async move {
            ctx.set_disposer(FnDisposer::new(|_resources| {
                futures::future::pending::<std::result::Result<(), BoxError>>()
            }))?;
            Ok(())
        })
    }
}

// =============================================================================
// Composition and concurrency
// =============================================================================

#[tokio::test]
async fn test_nested_steps_tear_down_innermost_first() {
    let journal = Journal::default();
    let outer = NamedWrapper::new("outer", &journal, ("LAYER", "outer"));
    let inner = NamedWrapper::new("inner", &journal, ("LAYER", "inner"));
    let seen = Arc::new(Mutex::new(None));
    let body = {
        let seen = seen.clone();
        let journal = journal.clone();
        Arc::new(FnBody::new(move |inv: BodyInvocation| {
            *seen.lock().unwrap() = Some(inv.env().clone());
            record(&journal, "body");
            async { Ok::<_, BoxError>(7) }
        }))
    };
    let (res, _) = resources();

    let nested = Arc::new(WrapperStep::new(inner).around(body));
    let value = WrapperStep::new(outer)
        .start(res, env(&[("PATH", "/bin")]), nested)
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert_eq!(
        seen.lock().unwrap().clone().unwrap(),
        env(&[("LAYER", "inner"), ("PATH", "/bin")])
    );
    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            "setup outer",
            "setup inner",
            "body",
            "teardown inner",
            "teardown outer"
        ]
    );
}

#[tokio::test]
async fn test_nested_body_failure_reaches_outer_caller() {
    let journal = Journal::default();
    let outer = NamedWrapper::new("outer", &journal, ("A", "1"));
    let inner = NamedWrapper::new("inner", &journal, ("B", "2"));
    let body = Arc::new(FnBody::new(|_inv: BodyInvocation| async {
        Err::<(), BoxError>("deep".into())
    }));
    let (res, _) = resources();

    let nested = Arc::new(WrapperStep::new(inner).around(body));
    let err = WrapperStep::new(outer)
        .start(res, EnvVars::new(), nested)
        .unwrap()
        .join()
        .await
        .unwrap_err();

    let inner_err = err.body_cause().unwrap().downcast_ref::<Error>().unwrap();
    assert_eq!(inner_err.body_cause().unwrap().to_string(), "deep");
    assert!(journal.lock().unwrap().ends_with(&[
        "teardown inner".to_string(),
        "teardown outer".to_string()
    ]));
}

/// Wrapper that sets one variable and logs its setup and teardown by name.
struct NamedWrapper {
    name: &'static str,
    journal: Journal,
    binding: (&'static str, &'static str),
}

impl NamedWrapper {
    fn new(name: &'static str, journal: &Journal, binding: (&'static str, &'static str)) -> Self {
        Self {
            name,
            journal: journal.clone(),
            binding,
        }
    }
}

impl Wrapper for NamedWrapper {
    fn name(&self) -> &str {
        self.name
    }

    fn set_up<'a>(
        &'a self,
        ctx: &'a mut SetupContext,
        _resources: &'a StepResources,
        _env: &'a EnvVars,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>> {
        Box::pin(async move {
            record(&self.journal, &format!("setup {}", self.name));
            ctx.env(self.binding.0, self.binding.1);
            let journal = self.journal.clone();
            let name = self.name;
            ctx.set_disposer(FnDisposer::new(move |_resources| async move {
                record(&journal, &format!("teardown {}", name));
                Ok::<(), BoxError>(())
            }))?;
            Ok(())
        })
    }
}

#[tokio::test]
async fn test_independent_executions_run_concurrently() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Ok);
    let step = WrapperStep::new(wrapper.clone());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let (res, _) = resources();
            let body = Arc::new(FnBody::new(move |_inv: BodyInvocation| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, BoxError>(i)
            }));
            step.start(res, EnvVars::new(), body).unwrap()
        })
        .collect();

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.join().await.unwrap());
    }

    assert_eq!(values, (0..8).collect::<Vec<_>>());
    assert_eq!(wrapper.teardown_calls(), 8);
}

// =============================================================================
// Panics
// =============================================================================

/// Where [`PanickingWrapper`] panics. `Early` panics happen while the future
/// is being built, `Late` ones while it is being polled.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PanicAt {
    SetupEarly,
    SetupLate,
    TeardownEarly,
    TeardownLate,
}

struct PanickingWrapper(PanicAt);

impl Wrapper for PanickingWrapper {
    fn name(&self) -> &str {
        "panicking"
    }

    fn set_up<'a>(
        &'a self,
        ctx: &'a mut SetupContext,
        _resources: &'a StepResources,
        _env: &'a EnvVars,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>> {
        let at = self.0;
        if at == PanicAt::SetupEarly {
            panic!("setup blew up early");
        }
        Box::pin(async move {
            if at == PanicAt::SetupLate {
                panic!("setup blew up late");
            }
            ctx.set_disposer(FnDisposer::new(move |_resources: StepResources| {
                if at == PanicAt::TeardownEarly {
                    panic!("teardown blew up early");
                }
                async move {
                    if at == PanicAt::TeardownLate {
                        panic!("teardown blew up late");
                    }
                    Ok::<(), BoxError>(())
                }
            }))?;
            Ok::<(), BoxError>(())
        })
    }
}

#[tokio::test]
async fn test_setup_panic_is_a_setup_failure() {
    for at in [PanicAt::SetupEarly, PanicAt::SetupLate] {
        let journal = Journal::default();
        let body = Arc::new(RecordingBody::new(&journal, || Ok(())));
        let (res, _) = resources();

        let err = WrapperStep::new(PanickingWrapper(at))
            .start(res, EnvVars::new(), body.clone())
            .unwrap()
            .join()
            .await
            .unwrap_err();

        assert!(err.is_setup_failure());
        assert!(err.to_string().contains("setup panicked: setup blew up"));
        assert_eq!(body.dispatches.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_teardown_panic_is_a_teardown_failure() {
    for at in [PanicAt::TeardownEarly, PanicAt::TeardownLate] {
        let journal = Journal::default();
        let body = Arc::new(RecordingBody::new(&journal, || Ok(7)));
        let (res, listener) = resources();

        let err = WrapperStep::new(PanickingWrapper(at))
            .start(res, EnvVars::new(), body)
            .unwrap()
            .join()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Teardown { .. }));
        let cause = err.teardown_cause().unwrap().to_string();
        assert!(cause.starts_with("teardown panicked: teardown blew up"));
        assert_eq!(listener.lines().len(), 1);
    }
}

#[tokio::test]
async fn test_body_panicking_during_dispatch_still_tears_down() {
    let journal = Journal::default();
    let wrapper = ScriptedWrapper::new(&journal).disposer(Teardown::Ok);
    let body = Arc::new(FnBody::new(
        |_inv: BodyInvocation| -> std::future::Ready<Outcome<u32>> {
            panic!("body closure blew up before returning its future")
        },
    ));
    let (res, _) = resources();

    let mut handle = WrapperStep::new(wrapper.clone())
        .start(res, EnvVars::new(), body)
        .unwrap();
    assert_eq!(
        handle.wait_for(ExecutionState::Done).await,
        ExecutionState::Done
    );
    let err = handle.join().await.unwrap_err();

    assert_eq!(err.kind(), "body");
    assert!(
        err.body_cause()
            .unwrap()
            .to_string()
            .starts_with("body dispatch panicked:")
    );
    assert_eq!(wrapper.teardown_calls(), 1);
    assert_eq!(*journal.lock().unwrap(), vec!["setup", "teardown"]);
}

#[test]
fn test_start_outside_runtime_is_a_dispatch_error() {
    let journal = Journal::default();
    let body = Arc::new(RecordingBody::new(&journal, || Ok(())));
    let (res, _) = resources();

    let result =
        WrapperStep::new(ScriptedWrapper::new(&journal)).start(res, EnvVars::new(), body);

    assert!(matches!(result, Err(Error::Dispatch(_))));
    assert!(journal.lock().unwrap().is_empty());
}

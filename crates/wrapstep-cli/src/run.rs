//! Run command implementation for wrapstep CLI.
//!
//! Composes the requested wrappers around a single program and runs it.

use std::path::PathBuf;
use std::sync::Arc;

use wrapstep_core::{
    BodyInvocation, BodyInvoker, BoxError, EnvVars, Error, FnBody, ProcessSpec, RunHandle,
    StepConfig, StepResources, Workspace, WrapperStep,
};

use crate::wrappers::{EnvWrapper, ScratchDirWrapper};

/// Exit code used when a wrapper's setup failed.
pub const EXIT_SETUP_FAILED: i32 = 125;

/// Exit code used when a teardown failed.
pub const EXIT_TEARDOWN_FAILED: i32 = 124;

/// The program exited unsuccessfully.
#[derive(Debug, thiserror::Error)]
#[error("`{command}` exited with status {code}")]
pub struct ProcessFailed {
    pub command: String,
    pub code: i32,
}

/// Options for a single `run` invocation.
#[derive(Debug)]
pub struct RunOptions {
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub scratch: bool,
    pub workspace: Option<PathBuf>,
    pub config: StepConfig,
}

/// Run the command and return the process exit code to use.
pub async fn execute(options: RunOptions) -> anyhow::Result<i32> {
    let Some((program, args)) = options.command.split_first() else {
        anyhow::bail!("no command given");
    };

    let mut bindings = EnvVars::new();
    for assignment in &options.env {
        let (key, value) = EnvVars::parse_assignment(assignment)?;
        bindings.insert(key, value);
    }

    let workspace = match options.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let ambient = if options.config.inherit_process_env {
        EnvVars::from_process()
    } else {
        EnvVars::new()
    };
    let resources = StepResources::new(RunHandle::new(program.as_str()), Workspace::new(workspace));

    let mut steps = vec![WrapperStep::new(EnvWrapper::new(bindings))];
    if options.scratch {
        steps.push(WrapperStep::new(ScratchDirWrapper));
    }
    let steps: Vec<WrapperStep> = steps
        .into_iter()
        .map(|step| step.with_config(options.config.clone()))
        .collect();

    let spec = ProcessSpec::new(program.as_str()).args(args.iter().cloned());
    let body = compose(&steps[1..], process_body(spec));

    tracing::debug!(wrappers = steps.len(), "starting execution");
    let handle = steps[0].start(resources, ambient, body)?;

    let cancel = handle.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel("interrupted");
        }
    });
    let result = handle.join().await;
    interrupt.abort();

    Ok(report(result))
}

/// Innermost body: run the program under the body environment.
fn process_body(spec: ProcessSpec) -> Arc<dyn BodyInvoker<i32>> {
    Arc::new(FnBody::new(move |inv: BodyInvocation| {
        let spec = spec.clone();
        async move {
            let resources = inv.resources();
            let code = resources
                .launcher
                .launch(&spec, inv.env(), resources.workspace.path())
                .await?;
            if code != 0 {
                return Err(Box::new(ProcessFailed {
                    command: spec.to_string(),
                    code,
                }) as BoxError);
            }
            Ok::<i32, BoxError>(code)
        }
    }))
}

/// Nest `steps` (outermost first) around `body`.
fn compose(steps: &[WrapperStep], body: Arc<dyn BodyInvoker<i32>>) -> Arc<dyn BodyInvoker<i32>> {
    steps
        .iter()
        .rev()
        .fold(body, |inner, step| Arc::new(step.clone().around(inner)))
}

/// Print the outcome and map it to an exit code.
fn report(result: wrapstep_core::Result<i32>) -> i32 {
    let err = match result {
        Ok(code) => return code,
        Err(err) => err,
    };

    let err = innermost(&err);
    eprintln!("wrapstep: {} failure: {}", err.kind(), err);
    match err {
        Error::Setup { .. } => EXIT_SETUP_FAILED,
        Error::Teardown { .. } | Error::BodyAndTeardown { .. } => EXIT_TEARDOWN_FAILED,
        _ => find_cause::<ProcessFailed>(err).map_or(1, |failed| failed.code),
    }
}

/// Strip the body failures a nested step's outcome is wrapped in.
fn innermost(err: &Error) -> &Error {
    let mut current = err;
    while let Error::Body { source } = current {
        match source.downcast_ref::<Error>() {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// Walk the source chain looking for an error of type `E`.
fn find_cause<'a, E: std::error::Error + 'static>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a E> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<E>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

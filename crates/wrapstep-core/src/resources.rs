//! Collaborator handles shared by setup, body and teardown.
//!
//! These are passed through the lifecycle unchanged. Nothing in the core
//! mutates them; they are cloned by reference into every execution.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::env::EnvVars;
use crate::error::Result;

/// Identifies the unit of work an execution belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    id: Uuid,
    name: String,
}

impl RunHandle {
    /// Create a handle with a fresh identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.simple().to_string();
        write!(f, "{}#{}", self.name, &id[..8])
    }
}

/// Handle to the filesystem location the work runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a path relative to the workspace root.
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }
}

/// An external program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Capability for spawning external processes.
pub trait Launcher: Send + Sync {
    /// Run `spec` to completion under exactly `env` in `cwd`.
    ///
    /// Returns the exit code; a process killed by a signal reports `-1`.
    /// Dropping the returned future kills the process.
    fn launch<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        env: &'a EnvVars,
        cwd: &'a Path,
    ) -> BoxFuture<'a, Result<i32>>;
}

/// Launcher that runs processes on the local machine via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

impl Launcher for LocalLauncher {
    fn launch<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        env: &'a EnvVars,
        cwd: &'a Path,
    ) -> BoxFuture<'a, Result<i32>> {
        Box::pin(async move {
            tracing::debug!(command = %spec, cwd = %cwd.display(), "launching process");
            let status = tokio::process::Command::new(&spec.program)
                .args(&spec.args)
                .env_clear()
                .envs(env)
                .current_dir(cwd)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await?;
            Ok(status.code().unwrap_or(-1))
        })
    }
}

/// User-facing sink for progress and diagnostic output.
pub trait TaskListener: Send + Sync {
    fn log(&self, message: &str);

    fn error(&self, message: &str) {
        self.log(&format!("ERROR: {}", message));
    }
}

/// Listener that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl TaskListener for TracingListener {
    fn log(&self, message: &str) {
        tracing::info!(target: "wrapstep::listener", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "wrapstep::listener", "{}", message);
    }
}

/// Listener that records every line, for tests and for replaying output.
#[derive(Debug, Default)]
pub struct MemoryListener {
    lines: Mutex<Vec<String>>,
}

impl MemoryListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines logged so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TaskListener for MemoryListener {
    fn log(&self, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

/// The run/workspace/launcher/listener bundle handed to setup and teardown.
///
/// Cloning is cheap; clones share the same launcher and listener.
#[derive(Clone)]
pub struct StepResources {
    pub run: RunHandle,
    pub workspace: Workspace,
    pub launcher: Arc<dyn Launcher>,
    pub listener: Arc<dyn TaskListener>,
}

impl StepResources {
    /// Resources with a local launcher and a tracing listener.
    pub fn new(run: RunHandle, workspace: Workspace) -> Self {
        Self {
            run,
            workspace,
            launcher: Arc::new(LocalLauncher),
            listener: Arc::new(TracingListener),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listener = listener;
        self
    }
}

impl fmt::Debug for StepResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepResources")
            .field("run", &self.run)
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

//! Concrete wrappers offered by the CLI.

use std::path::PathBuf;

use futures::future::BoxFuture;
use wrapstep_core::{BoxError, EnvVars, FnDisposer, SetupContext, StepResources, Wrapper};

/// Directory under the workspace that holds scratch directories.
pub const SCRATCH_ROOT: &str = ".wrapstep";

/// Variable that points the body at its scratch directory.
pub const SCRATCH_VAR: &str = "WRAPSTEP_SCRATCH";

/// Adds fixed bindings to the body's environment.
pub struct EnvWrapper {
    bindings: EnvVars,
}

impl EnvWrapper {
    pub fn new(bindings: EnvVars) -> Self {
        Self { bindings }
    }
}

impl Wrapper for EnvWrapper {
    fn name(&self) -> &str {
        "env"
    }

    fn set_up<'a>(
        &'a self,
        ctx: &'a mut SetupContext,
        resources: &'a StepResources,
        _env: &'a EnvVars,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            if self.bindings.is_empty() {
                return Ok(());
            }
            let names: Vec<&str> = self.bindings.iter().map(|(k, _)| k).collect();
            resources
                .listener
                .log(&format!("setting {}", names.join(", ")));
            ctx.set_env(self.bindings.clone());
            Ok(())
        })
    }
}

/// Creates a private scratch directory for the body and removes it after.
///
/// The directory is exported as `WRAPSTEP_SCRATCH` and `TMPDIR`.
#[derive(Debug, Default)]
pub struct ScratchDirWrapper;

impl ScratchDirWrapper {
    fn scratch_path(resources: &StepResources) -> PathBuf {
        let name = format!("scratch-{}", uuid::Uuid::new_v4().simple());
        resources.workspace.join(SCRATCH_ROOT).join(name)
    }
}

impl Wrapper for ScratchDirWrapper {
    fn name(&self) -> &str {
        "scratch"
    }

    fn set_up<'a>(
        &'a self,
        ctx: &'a mut SetupContext,
        resources: &'a StepResources,
        _env: &'a EnvVars,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            let dir = Self::scratch_path(resources);
            tokio::fs::create_dir_all(&dir).await?;
            resources
                .listener
                .log(&format!("created scratch directory {}", dir.display()));

            // Registered right after creation so a later failure still cleans up.
            let target = dir.clone();
            ctx.set_disposer(FnDisposer::new(move |resources: StepResources| async move {
                tokio::fs::remove_dir_all(&target).await?;
                resources
                    .listener
                    .log(&format!("removed scratch directory {}", target.display()));
                Ok::<(), BoxError>(())
            }))?;

            let dir = dir.to_string_lossy().into_owned();
            ctx.env(SCRATCH_VAR, dir.clone());
            ctx.env("TMPDIR", dir);
            Ok(())
        })
    }
}

//! wrapstep CLI - Run a command inside composed environment wrappers.

mod run;
mod wrappers;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use wrapstep_core::{StepConfig, WrapperStep};

#[derive(Parser)]
#[command(name = "wrapstep")]
#[command(about = "Run a command inside composed environment wrappers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command with setup before it and teardown after it
    Run {
        /// Add KEY=VALUE to the command's environment (repeatable)
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Give the command a private scratch directory, removed afterwards
        #[arg(long)]
        scratch: bool,

        /// Directory the command runs in (default: current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// JSON step configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Give up on a teardown after this many milliseconds
        #[arg(long, value_name = "MS")]
        teardown_timeout_ms: Option<u64>,

        /// Start from an empty environment instead of the process environment
        #[arg(long)]
        no_inherit_env: bool,

        /// The command and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Print the step descriptor as JSON
    Describe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            env,
            scratch,
            workspace,
            config,
            teardown_timeout_ms,
            no_inherit_env,
            command,
        } => {
            let mut step_config = match config {
                Some(path) => StepConfig::load(&path)?,
                None => StepConfig::default(),
            };
            if let Some(ms) = teardown_timeout_ms {
                step_config = step_config.with_teardown_timeout(Duration::from_millis(ms));
            }
            if no_inherit_env {
                step_config.inherit_process_env = false;
            }

            let code = run::execute(run::RunOptions {
                command,
                env,
                scratch,
                workspace,
                config: step_config,
            })
            .await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Describe => {
            println!("{}", serde_json::to_string_pretty(&WrapperStep::DESCRIPTOR)?);
        }
    }

    Ok(())
}

//! CLI for preview environment provisioning
//!
//! Run `prenv --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

mod commands;
mod context;
mod export;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::DeployArgs;
use context::Context;
use prenv_config::Environment;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "prenv")]
#[command(about = "Per-pull-request preview environments")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the JSON config documents
    #[arg(long, env = "PRENV_CONFIG_DIR", default_value = ".prenv", global = true)]
    config_dir: PathBuf,

    /// Terraform state to read `${tf:...}` outputs from (local path or s3:// URL)
    #[arg(long, env = "PRENV_TFSTATE", global = true)]
    tfstate: Option<String>,

    /// Role to assume before reading `${ssm:...}` parameters
    #[arg(long, env = "PRENV_SSM_ROLE", global = true)]
    ssm_role: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Env,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and resolve every config document without side effects
    Check {
        #[command(flatten)]
        deploy: DeployArgs,
    },

    /// Resolve the task definition into the deployment config
    Render {
        #[command(flatten)]
        deploy: DeployArgs,

        /// Output path (defaults to deployment_config.json in the config directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace `PRENV_*` variable names in a text file with their values
    Template {
        /// Template file
        input: PathBuf,

        /// Destination file
        output: PathBuf,
    },

    /// Database lease management
    Database {
        #[command(subcommand)]
        action: DatabaseAction,
    },
}

#[derive(Subcommand, Debug)]
enum DatabaseAction {
    /// Lease a database to a pull request and print its bindings
    Allocate {
        #[command(flatten)]
        deploy: DeployArgs,

        /// GitHub token used for label operations
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: String,

        /// Output format: env, json
        #[arg(short, long, default_value = "env")]
        format: OutputFormat,

        /// Append the bindings to this file (typically `$GITHUB_ENV`)
        #[arg(long, env = "GITHUB_ENV")]
        github_env: Option<PathBuf>,
    },

    /// Drop the database lease held by a pull request
    Release {
        #[command(flatten)]
        deploy: DeployArgs,

        /// GitHub token used for label operations
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: String,
    },
}

async fn context(cli: &Cli) -> Result<Context> {
    Context::build(
        &cli.config_dir,
        cli.tfstate.as_deref(),
        cli.ssm_role.as_deref(),
        Environment::from_process(),
    )
    .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout carries command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    match &cli.command {
        Commands::Check { deploy } => commands::run_check(context(&cli).await?, deploy).await,
        Commands::Render { deploy, output } => {
            commands::run_render(context(&cli).await?, deploy, output.clone()).await
        }
        Commands::Template { input, output } => {
            commands::run_template(&Environment::from_process(), input, output)
        }
        Commands::Database { action } => match action {
            DatabaseAction::Allocate {
                deploy,
                github_token,
                format,
                github_env,
            } => {
                commands::run_allocate(
                    context(&cli).await?,
                    deploy,
                    github_token,
                    *format,
                    github_env.as_deref(),
                )
                .await
            }
            DatabaseAction::Release {
                deploy,
                github_token,
            } => commands::run_release(deploy, github_token).await,
        },
    }
}

//! dcx - devcontainer CLI

use clap::{Parser, Subcommand};
use dcx_cli::commands::{self, UpOptions, WorkspaceArgs};
use dcx_config::GlobalConfig;
use dcx_provider::TokioRunner;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dcx")]
#[command(author, version, about = "Devcontainer CLI", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the parsed devcontainer.json as JSON
    ReadConfiguration {
        #[command(flatten)]
        workspace: WorkspaceArgs,
    },

    /// Build, create, and start the devcontainer, then run its lifecycle hooks
    Up {
        #[command(flatten)]
        workspace: WorkspaceArgs,
        /// Docker CLI to use
        #[arg(long)]
        docker_path: Option<String>,
        /// Rebuild images before starting
        #[arg(long)]
        build: bool,
        /// Exit once waitFor has run, skipping the hooks after it
        #[arg(long)]
        skip_post_ready: bool,
    },

    /// Run a command in the devcontainer
    Exec {
        #[command(flatten)]
        workspace: WorkspaceArgs,
        /// Command to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        cmd: Vec<String>,
    },

    /// Stop the devcontainer
    Down {
        #[command(flatten)]
        workspace: WorkspaceArgs,
        /// Remove the container without stopping it gracefully
        #[arg(short, long)]
        force: bool,
    },

    /// Show global configuration
    Config,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    let global = GlobalConfig::load().unwrap_or_default();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&global.logging.level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let runner = Arc::new(TokioRunner::new());

    match cli.command {
        Commands::ReadConfiguration { workspace } => {
            let output = commands::read_configuration(&workspace, &global)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Up {
            workspace,
            docker_path,
            build,
            skip_post_ready,
        } => {
            let options = UpOptions {
                docker_path,
                build,
                skip_post_ready,
            };
            let output = commands::up(runner, &workspace, &global, &options).await?;
            println!("{}", output);
        }
        Commands::Exec { workspace, cmd } => {
            return commands::exec(runner, &workspace, &global, cmd).await;
        }
        Commands::Down { workspace, force } => {
            commands::down(runner, &workspace, &global, force).await?;
        }
        Commands::Config => {
            print!("{}", commands::show_config(&global)?);
        }
    }

    Ok(0)
}

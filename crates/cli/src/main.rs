//! cogloop CLI: the main entry point.
//!
//! Commands:
//! - `run`: Run one reasoning session for a query
//! - `config`: Show, locate, or validate the configuration
//! - `onboard`: Write a default config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "cogloop",
    about = "cogloop: reason, critique, refine until the answer holds up",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reasoning session
    Run {
        /// The question to reason about
        query: String,

        /// Override reasoning.max_rounds
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Stop after N rounds without a confidence improvement
        #[arg(long)]
        stagnation_window: Option<u32>,

        /// Per agent-call timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Initialize configuration
    Onboard,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (default)
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration and report warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `run --json` output stays parseable.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            query,
            max_rounds,
            stagnation_window,
            timeout,
            json,
        } => {
            let options = commands::run::RunOptions {
                max_rounds,
                stagnation_window,
                timeout_secs: timeout,
                json,
            };
            commands::run::run(query, options).await?
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}

//! cadence CLI - Main Entry Point

use std::path::PathBuf;

use cadence_e2e::config::{BASE_URL_ENV, SEED_ENV};
use clap::{Parser, Subcommand};

use cadence_cli::commands::{list, run, validate, worker, GlobalOpts};
use cadence_cli::output::{self, OutputFormat};

/// cadence - declarative end-to-end tests for HTTP APIs and web UIs
#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(short, long, default_value = "cadence.toml", global = true)]
    config: PathBuf,

    /// Base URL of the service under test (overrides config and environment)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Seed for generated identifiers
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run suites
    Run(run::RunArgs),

    /// Run a single suite file and print its result as JSON
    #[command(hide = true)]
    Worker(worker::WorkerArgs),

    /// List suites
    List(list::ListArgs),

    /// Check configuration and suite files
    Validate(validate::ValidateArgs),

    /// Show version information
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let opts = GlobalOpts {
        config: cli.config,
        base_url: cli.base_url,
        seed: cli.seed,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Run(args) => {
            let summary = run::execute(args, &opts).await?;
            output::print_summary(&summary, cli.format);
            if !summary.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Worker(args) => worker::execute(args, &opts).await?,
        Commands::List(args) => list::execute(args, &opts, cli.format).await?,
        Commands::Validate(args) => {
            let invalid = validate::execute(args, &opts).await?;
            if invalid > 0 {
                output::print_error(&format!("{} invalid suite file(s)", invalid));
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("cadence v{}", env!("CARGO_PKG_VERSION"));
            println!("Declarative end-to-end test orchestration");
            println!();
            println!("Environment:");
            println!("  {}  overrides base_url", BASE_URL_ENV);
            println!("  {}      overrides seed", SEED_ENV);
        }
    }

    Ok(())
}

//! Capsule - container runtime selection and capsule image cache
//!
//! CLI entry point that dispatches to subcommands.

use capsule::cli::{Cli, Commands};
use capsule::config::ConfigManager;
use capsule::error::CapsuleResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CapsuleResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor state
    if let Commands::Completions { shell } = cli.command {
        return capsule::cli::commands::completions(shell);
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config.general.log_format);
    debug!("Using config {}", config_manager.path().display());

    ConfigManager::ensure_state_dirs().await?;

    match cli.command {
        Commands::Completions { .. } => unreachable!("Completions handled above"),
        Commands::Select => capsule::cli::commands::select(&config).await,
        Commands::Runtimes(args) => capsule::cli::commands::runtimes(args, &config).await,
        Commands::Info => capsule::cli::commands::info(&config).await,
        Commands::Benchmark(args) => capsule::cli::commands::benchmark(args, &config).await,
        Commands::Recommend => capsule::cli::commands::recommend(&config).await,
        Commands::Capsule(args) => capsule::cli::commands::capsule(args, &config).await,
        Commands::Config(args) => {
            capsule::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug. Logs go to stderr so stdout stays scriptable.
fn init_logging(verbose: u8, log_format: &str) {
    let filter = match verbose {
        0 => EnvFilter::new("capsule=warn"),
        1 => EnvFilter::new("capsule=info"),
        _ => EnvFilter::new("capsule=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);

    if log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

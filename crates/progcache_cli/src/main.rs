//! pcache
//!
//! Warms up and inspects progcache program binary caches.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod compiler;
mod config;

use cli::{Cli, Commands};
use config::Config;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path).into_diagnostic()?,
        None => Config::discover().into_diagnostic()?,
    };
    let cache_dir: PathBuf = cli.cache_dir.clone().unwrap_or_else(|| config.cache_path());

    match &cli.command {
        Commands::Warmup {
            dir,
            recursive,
            extension,
            options,
        } => commands::warmup::run_warmup(
            &config,
            &cache_dir,
            dir,
            *recursive,
            extension.as_deref(),
            options.as_deref(),
        ),
        Commands::Stats => commands::inspect::run_stats(&cache_dir).map(|_| false),
        Commands::List => commands::inspect::run_list(&cache_dir).map(|_| false),
        Commands::Verify { prune } => commands::verify::run_verify(&cache_dir, *prune),
        Commands::Clear => commands::inspect::run_clear(&cache_dir).map(|_| false),
    }
}

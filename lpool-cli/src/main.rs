mod cli;
mod commands;
mod config;
mod error;
mod output;

use crate::{
    cli::{Args, Commands},
    commands::CommandExecutor,
    config::AppConfig,
    error::{CliError, Result},
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use std::process;
use tracing::{debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILTER: &str = "lpool=info,leslies_pool=info";

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let output_format = args.command.output_format();

    if let Err(e) = run(args).await {
        match output_format {
            Some(format) if format.is_json() => {
                let error_json = serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                });
                println!("{error_json}");
            }
            _ => {
                error!("Application error: {:#}", e);
                #[cfg(feature = "colored-output")]
                {
                    eprintln!("{} {:#}", "Error:".red().bold(), e);
                }
                #[cfg(not(feature = "colored-output"))]
                {
                    eprintln!("Error: {:#}", e);
                }
            }
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    use anyhow::Context;

    init_logging(args.verbose, args.quiet, args.log_json)?;

    let config = AppConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(&args);
    debug!(?config, "Loaded configuration");

    let colored = cfg!(feature = "colored-output");

    match args.command {
        Commands::Fetch { output } => {
            CommandExecutor::new(config, colored)
                .fetch(output)
                .await
                .context("Failed to fetch water test")?;
        }
        Commands::Poll { output, count } => {
            CommandExecutor::new(config, colored)
                .poll(output, count)
                .await
                .context("Polling failed")?;
        }
        Commands::Config { show, reset } => {
            if reset {
                AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults");
            } else if show {
                let config = AppConfig::load(args.config.as_deref())?;
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, json: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("lpool=debug,leslies_pool=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbose)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.map_err(|e| CliError::Logging(e.to_string()))
}

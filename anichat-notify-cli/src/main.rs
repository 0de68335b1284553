mod cli;
mod commands;
mod config;
mod output;

use std::io::IsTerminal;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands, LogFormat},
    commands::CommandExecutor,
    config::AppConfig,
    output::OutputManager,
};

const DEFAULT_LOG_FILTER: &str = "anichat_notify=info,anichat_notify_cli=info";

#[tokio::main]
async fn main() {
    // Load .env before clap reads the environment.
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        #[cfg(feature = "colored-output")]
        {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
        }
        #[cfg(not(feature = "colored-output"))]
        {
            eprintln!("Error: {:#}", e);
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.log_level.as_deref(), args.log_format)?;

    let config = AppConfig::load(&args)?;
    let colored = std::io::stdout().is_terminal();
    let executor = CommandExecutor::new(config, OutputManager::new(colored));

    match args.command {
        Commands::Watch { json } => executor.watch(json).await,
        Commands::List { unread, json } => executor.list(unread, json).await,
        Commands::MarkAllRead { json } => executor.mark_all_read(json).await,
    }
}

fn log_filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        // A bare level applies to this workspace only; directives pass through.
        Some(level) if !level.contains(['=', ',']) => {
            EnvFilter::try_new(format!("anichat_notify={level},anichat_notify_cli={level}"))
                .with_context(|| format!("Invalid log level {level}"))
        }
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter {directives}")),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

fn init_logging(level: Option<&str>, format: LogFormat) -> Result<()> {
    let filter = log_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries toasts and JSON output.
    let result = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    result.context("Failed to set global default subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_forms() {
        assert!(log_filter(Some("debug")).is_ok());
        assert!(log_filter(Some("anichat_notify=trace,reqwest=warn")).is_ok());
        assert!(log_filter(Some("not a level")).is_err());
    }
}

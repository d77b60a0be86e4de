//! Toolforge CLI - Main entry point

mod cli;
mod context;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolforge_core::SchemaFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Toolforge - supervise local tool providers and run their tools
#[derive(Parser, Debug)]
#[command(name = "toolforge")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ./toolforge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start configured providers and print their status
    Status,
    /// List registered tools
    Tools {
        /// Print consumer schemas (anthropic, openai, gemini) instead of a table
        #[arg(short, long)]
        format: Option<SchemaFormat>,
        /// Include disabled tools
        #[arg(short, long)]
        all: bool,
    },
    /// Enable a tool
    Enable { id: String },
    /// Disable a tool
    Disable { id: String },
    /// Execute a tool with JSON arguments
    Run {
        /// Tool id or name
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
        /// Timeout in milliseconds (capped by execution.max_timeout_ms)
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Attempts for retryable failures
        #[arg(short, long)]
        retries: Option<u32>,
        /// Approve every permission check
        #[arg(short, long)]
        yes: bool,
    },
    /// Show recent executions
    History {
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Failed executions only
        #[arg(long)]
        failed: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = context::config_path(args.config);

    match args.command {
        Command::Status => cli::status(&config_path).await,
        Command::Tools { format, all } => cli::tools(&config_path, format, all).await,
        Command::Enable { id } => cli::set_enabled(&config_path, &id, true).await,
        Command::Disable { id } => cli::set_enabled(&config_path, &id, false).await,
        Command::Run {
            tool,
            args,
            timeout,
            retries,
            yes,
        } => cli::run(&config_path, &tool, &args, timeout, retries, yes).await,
        Command::History { limit, failed } => cli::history(limit, failed),
    }
}

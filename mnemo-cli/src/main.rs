//! Mnemo CLI - stage, commit and recall memory records
//!
//! # Usage
//!
//! ```bash
//! mnemo add "the deploy key rotates on mondays"
//! mnemo list
//! mnemo commit
//! mnemo query "deploy key" --limit 5
//! mnemo reinforce 1 0.5
//! mnemo decay
//! mnemo --output-format json records
//! mnemo --root /tmp/mem config show
//! ```

mod commands;
mod context;
mod output;

use clap::Parser;
use commands::Command;
use context::CliContext;
use output::{OutputFormat, OutputFormatter};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnemo")]
#[command(version)]
#[command(about = "Mnemo - durable staged memory with ranked recall", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", env = "MNEMO_CONFIG")]
    config: Option<PathBuf>,

    /// Memory root directory (overrides the configuration file)
    #[arg(short, long, global = true, value_name = "DIR", env = "MNEMO_ROOT")]
    root: Option<PathBuf>,

    /// Output format (table, json, plain)
    #[arg(short, long, global = true, default_value = "table")]
    output_format: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("mnemo={}", level).parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let output_format: OutputFormat = cli.output_format.parse().unwrap_or_else(|e| {
        eprintln!("Warning: {}. Using table format.", e);
        OutputFormat::Table
    });

    let ctx = CliContext::new(cli.config, cli.root, output_format)?;
    if let Err(e) = commands::execute(&ctx, cli.command) {
        OutputFormatter::new(output_format).error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

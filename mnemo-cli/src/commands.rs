//! Subcommand definitions and their execution against the memory service

use crate::context::CliContext;
use crate::output::{OutputFormat, OutputFormatter};
use clap::Subcommand;
use mnemo::{MemoryId, MemoryQuery};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stage a new record
    Add {
        /// Record text
        text: String,
    },

    /// Replace the text of a staged record
    Edit {
        id: u64,
        text: String,
    },

    /// List staged records
    List,

    /// Promote every staged record into the committed store
    Commit,

    /// Drop every staged record
    Discard,

    /// Rank committed records against a query (empty text matches all)
    Query {
        #[arg(default_value = "")]
        text: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Adjust the strength of a committed record
    Reinforce {
        id: u64,

        #[arg(allow_negative_numbers = true)]
        delta: f32,
    },

    /// Apply one decay sweep to every committed record
    Decay,

    /// Snapshot the committed store and truncate its journal
    Checkpoint,

    /// List committed records
    Records,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
}

pub fn execute(ctx: &CliContext, command: Command) -> anyhow::Result<()> {
    let formatter = OutputFormatter::new(ctx.output_format);

    if let Command::Config { command } = &command {
        return match command {
            ConfigCommand::Show => show_config(ctx, &formatter),
        };
    }

    let svc = ctx.open_service()?;
    match command {
        Command::Add { text } => {
            let id = svc.stage_add(&text)?;
            match ctx.output_format {
                OutputFormat::Json => formatter.json(&serde_json::json!({ "id": id })),
                _ => formatter.success(&format!("Staged memory {}", id)),
            }
        }
        Command::Edit { id, text } => {
            svc.stage_edit(MemoryId(id), &text)?;
            formatter.success(&format!("Edited staged memory {}", id));
        }
        Command::List => formatter.records("Staged", &svc.stage_list()?),
        Command::Commit => {
            let committed = svc.stage_commit()?;
            match ctx.output_format {
                OutputFormat::Json => formatter.json(&committed),
                _ => formatter.success(&format!("Committed {} records", committed.len())),
            }
        }
        Command::Discard => {
            svc.stage_discard()?;
            formatter.success("Discarded staged records");
        }
        Command::Query { text, limit } => {
            let results = svc.store_query(&MemoryQuery::new(text.as_str(), limit))?;
            formatter.results(&text, &results);
        }
        Command::Reinforce { id, delta } => {
            svc.reinforce(MemoryId(id), delta)?;
            match svc.committed_record(MemoryId(id))? {
                Some(record) => formatter.success(&format!(
                    "Memory {} strength is now {:.4}",
                    id, record.strength
                )),
                None => formatter.success(&format!("Reinforced memory {}", id)),
            }
        }
        Command::Decay => {
            svc.decay_sweep()?;
            formatter.success(&format!(
                "Decayed {} records by {}",
                svc.committed_len()?,
                ctx.config.decay_factor
            ));
        }
        Command::Checkpoint => {
            svc.checkpoint()?;
            formatter.success("Checkpoint written");
        }
        Command::Records => formatter.records("Committed", &svc.committed_records()?),
        Command::Config { .. } => {}
    }
    Ok(())
}

fn show_config(ctx: &CliContext, formatter: &OutputFormatter) -> anyhow::Result<()> {
    let config = &ctx.config;
    match ctx.output_format {
        OutputFormat::Json => formatter.json(config),
        OutputFormat::Plain => print!("{}", config.to_toml_string()?),
        OutputFormat::Table => {
            formatter.section("Configuration");
            let source = ctx
                .config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(defaults)".to_string());
            formatter.kv("Config file", &source);
            formatter.kv("Root", &config.root.display().to_string());
            formatter.kv("Decay factor", &config.decay_factor.to_string());
            formatter.kv(
                "Journal compact threshold",
                &config.journal_compact_threshold.to_string(),
            );
            formatter.section("Scoring");
            formatter.kv("Keyword", &config.scoring.keyword.to_string());
            formatter.kv("Semantic", &config.scoring.semantic.to_string());
            formatter.kv("Age", &config.scoring.age.to_string());
            formatter.kv("Confidence", &config.scoring.confidence.to_string());
        }
    }
    Ok(())
}

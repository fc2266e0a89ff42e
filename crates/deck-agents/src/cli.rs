//! Command-line arguments
//!
//! Pipeline settings are layered: built-in defaults and `DECK_*` environment
//! variables, then the `--config` TOML file, then individual flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use deck_coordination::{ConfigError, PipelineConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Build a slide deck from an approved plan", long_about = None)]
pub struct Cli {
    /// Pipeline settings file (TOML: pool_size, retry_ceiling, tool_timeout_secs, state_dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Draft, approve and build a deck
    Build(BuildArgs),
    /// Print the persisted tasklist view of a plan
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Template document (JSON with presentationData.layouts)
    #[arg(long)]
    pub template: PathBuf,

    /// Plan document to use as the draft
    #[arg(long, conflicts_with = "content", required_unless_present = "content")]
    pub plan: Option<PathBuf>,

    /// Raw content (.txt, .md, .markdown) for the planner to turn into a draft
    #[arg(long, requires = "planner_url")]
    pub content: Option<PathBuf>,

    /// Base URL of the planning service
    #[arg(long, env = "DECK_PLANNER_URL")]
    pub planner_url: Option<String>,

    /// Base URL of the slide-editing service
    #[arg(long, env = "DECK_TOOL_URL", required_unless_present = "dry_run")]
    pub tool_url: Option<String>,

    /// Build without a slide service; batches are only logged. Wins over
    /// `--tool-url`.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Write dry-run batches to this directory
    #[arg(long, requires = "dry_run")]
    pub batch_dir: Option<PathBuf>,

    /// Approve the draft without asking
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,

    /// Append every pipeline event to this JSONL file
    #[arg(long)]
    pub events_log: Option<PathBuf>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Plan to show; lists stored plans when omitted
    #[arg(long)]
    pub plan_id: Option<String>,

    /// Directory of the JSON tasklist store
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

/// Flags overriding individual pipeline settings
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Directory of the JSON tasklist store (in memory when unset)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Attempts per task before a human is asked (at most 5)
    #[arg(long)]
    pub retry_ceiling: Option<u32>,

    /// Seconds before a slide tool call counts as a recoverable failure
    #[arg(long)]
    pub tool_timeout_secs: Option<u64>,
}

impl PipelineArgs {
    /// Resolve the effective configuration
    pub fn pipeline_config(&self, config_file: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
        let mut config = match config_file {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(dir) = &self.state_dir {
            config = config.with_state_dir(dir);
        }
        if let Some(pool_size) = self.pool_size {
            config = config.with_pool_size(pool_size);
        }
        if let Some(ceiling) = self.retry_ceiling {
            config = config.with_retry_ceiling(ceiling);
        }
        if let Some(secs) = self.tool_timeout_secs {
            config = config.with_tool_timeout(Duration::from_secs(secs));
        }
        config.validated()
    }
}

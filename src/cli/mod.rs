//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use output::OutputFormat;

pub mod commands;
pub mod output;

/// gxt - deterministic hash-bucket experiment assignment compiled to warehouse SQL
#[derive(Parser, Debug)]
#[command(name = "gxt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// [DEPRECATED] Enable JSON output for machine consumption.
    /// Use --output-format=json or -m instead.
    #[arg(long, global = true, hide = true)]
    pub robot: bool,

    /// Output format (human, json, jsonl, plain, tsv)
    #[arg(long, short = 'O', global = true, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Enable machine-readable JSON output (shorthand for --output-format=json).
    #[arg(long, short = 'm', global = true)]
    pub machine: bool,

    /// Force plain output (no colors)
    #[arg(long, global = true)]
    pub plain: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Extra config file layered over gxt_project.yml
    #[arg(long, global = true, env = "GXT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project root holding gxt_project.yml and experiments/
    #[arg(long, short = 'p', global = true, default_value = ".", env = "GXT_PROJECT_PATH")]
    pub project_path: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective output format, considering flags for backward compatibility.
    ///
    /// Priority order:
    /// 1. `--plain` → Plain format
    /// 2. `--output-format` → Explicit format
    /// 3. `--machine` → JSON format (shorthand)
    /// 4. `--robot` → JSON format (deprecated)
    /// 5. Default → Human format
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        if self.plain {
            return OutputFormat::Plain;
        }
        if let Some(fmt) = self.output_format {
            return fmt;
        }
        if self.machine || self.robot {
            return OutputFormat::Json;
        }
        OutputFormat::Human
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate experiment configs and audience queries
    Validate(commands::validate::ValidateArgs),

    /// List experiments
    List(commands::list::ListArgs),

    /// Show one experiment with its variant intervals
    Show(commands::show::ShowArgs),

    /// Compile (and optionally execute) an experiment's assignment SQL
    Run(commands::run::RunArgs),

    /// Show persisted assignments and recent runs
    Status(commands::status::StatusArgs),
}

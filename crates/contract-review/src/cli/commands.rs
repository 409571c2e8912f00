//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand};

use crate::transfer::rules;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind, overriding `server.host`
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind, overriding `server.port`
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Audit rule maintenance commands.
#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    /// Import rules from a CSV file
    Import {
        /// CSV file with the standard rule columns
        file: PathBuf,
    },

    /// Export all rules as CSV
    Export {
        /// Output file, `-` for stdout [default: 审核规则-<date>.csv]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Write the blank import template
    Template {
        /// Output file, `-` for stdout [default: 审核规则导入模板-<date>.csv]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

impl RulesCommand {
    /// Where `export` and `template` write: the `-o` path, else the dated
    /// download name in the current directory. `None` for `import`.
    #[must_use]
    pub fn output_path(&self, today: NaiveDate) -> Option<PathBuf> {
        match self {
            Self::Import { .. } => None,
            Self::Export { output } => Some(
                output
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(rules::export_file_name(today))),
            ),
            Self::Template { output } => Some(
                output
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(rules::template_file_name(today))),
            ),
        }
    }
}

/// Locate command arguments.
#[derive(Debug, Args)]
pub struct LocateCommand {
    /// Markdown file to search
    pub file: PathBuf,

    /// Text to find
    pub query: String,

    /// Print the document with the match wrapped in a highlight mark
    #[arg(long)]
    pub highlight: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to config file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

//! Command-line interface for contract-review.
//!
//! This module provides the CLI structure for the `crev` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{ConfigCommand, LocateCommand, RulesCommand, ServeCommand, StatusCommand};

/// crev - Contract review service
///
/// Serves the contract review API and offers offline maintenance of audit
/// rules and configuration.
#[derive(Debug, Parser)]
#[command(name = "crev")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve(ServeCommand),

    /// Show storage statistics
    Status(StatusCommand),

    /// Import, export or template audit rules
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Find text in a Markdown file the way the API locates risk excerpts
    Locate(LocateCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Verbosity requested by flags, `None` when neither `-v` nor `-q` was given.
    #[must_use]
    pub fn verbosity(&self) -> Option<Verbosity> {
        if self.quiet {
            Some(Verbosity::Quiet)
        } else {
            match self.verbose {
                0 => None,
                1 => Some(Verbosity::Verbose),
                _ => Some(Verbosity::Trace),
            }
        }
    }
}

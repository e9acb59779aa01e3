//! Command-line interface for discdrawer.
//!
//! This module provides the CLI structure for the `ddraw` binary and the
//! interactive measurement loop it runs.

mod commands;
pub mod measure;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    AddDiscArgs, ConfigCommand, DiscCommand, EditDiscArgs, MeasureCommand, StatsCommand,
    ThrowsCommand, UnitsArg,
};

/// ddraw - Your disc golf bag, with measured throws
///
/// Keeps a catalog of your discs and measures throw distances with GPS:
/// mark where you threw from, walk to the disc, mark where it landed.
#[derive(Debug, Parser)]
#[command(name = "ddraw")]
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
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the disc catalog
    #[command(subcommand)]
    Disc(DiscCommand),

    /// Measure a throw with a disc
    Measure(MeasureCommand),

    /// View or delete measured throws
    #[command(subcommand)]
    Throws(ThrowsCommand),

    /// Show catalog statistics
    Stats(StatsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

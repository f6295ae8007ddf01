//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::pipeline::AggregationStrategy;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;

/// bytefreq - concurrent byte-frequency scanner
///
/// Walks a directory tree, reads every file whose extension is on the
/// allow-list and counts how often each byte value occurs.
///
/// Examples:
///   bytefreq ./src
///   bytefreq ./src --workers 8 --chunk-size 4096
///   bytefreq ./src --extensions rs,toml --format json -o report.json
///   bytefreq ./src --dry-run
///   bytefreq --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory to scan
    ///
    /// When omitted, usage is printed and the program exits.
    #[arg(value_name = "ROOT")]
    pub root: Option<PathBuf>,

    /// Number of worker tasks reading files
    #[arg(short, long, value_name = "NUM", env = "BYTEFREQ_WORKERS")]
    pub workers: Option<usize>,

    /// Bytes requested per read
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Capacity of the observation queue (0 behaves like 1)
    #[arg(long, value_name = "SLOTS")]
    pub queue_capacity: Option<usize>,

    /// How worker output is merged into the table
    #[arg(long, value_name = "STRATEGY")]
    pub strategy: Option<AggregationStrategy>,

    /// File extensions to include (comma-separated)
    ///
    /// Example: --extensions go,txt,js,py
    #[arg(long, value_name = "EXTS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Directory or file names to skip (comma-separated)
    ///
    /// Example: --exclude node_modules,.git
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Also scan files whose name contains no dot
    #[arg(long)]
    pub include_extensionless: bool,

    /// Output file path for the report
    ///
    /// The symbols JSON is written next to it.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format for the report (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Print the summary only; write no files
    #[arg(long)]
    pub no_write: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .bytefreq.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: list the files that would be scanned and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .bytefreq.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format with text charts (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// One-line usage string.
    pub fn usage() -> String {
        Self::command().render_usage().to_string()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.workers == Some(0) {
            return Err("Workers must be at least 1".to_string());
        }

        if self.chunk_size == Some(0) {
            return Err("Chunk size must be at least 1 byte".to_string());
        }

        if let Some(ref extensions) = self.extensions {
            if extensions.iter().any(|ext| ext.starts_with('.')) {
                return Err("Extensions are given without the leading dot".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

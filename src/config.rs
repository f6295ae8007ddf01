//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.bytefreq.toml` files.

use crate::pipeline::AggregationStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".bytefreq.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Pipeline tunables.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default report path.
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "bytefreq_report.md".to_string()
}

/// Concurrency and buffering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Number of worker tasks reading files.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bytes requested per read; trades memory for syscalls.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Slots in the observation queue. 0 behaves like 1.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Slots in the paths queue between walker and workers.
    #[serde(default = "default_path_queue_capacity")]
    pub path_queue_capacity: usize,

    /// How observations are merged into the table.
    #[serde(default)]
    pub strategy: AggregationStrategy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunk_size: default_chunk_size(),
            queue_capacity: default_queue_capacity(),
            path_queue_capacity: default_path_queue_capacity(),
            strategy: AggregationStrategy::default(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_chunk_size() -> usize {
    100
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_path_queue_capacity() -> usize {
    1
}

/// File scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// File extensions to include.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Names to prune from the walk.
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Scan files whose name has no `.` at all.
    #[serde(default)]
    pub include_extensionless: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            excludes: Vec::new(),
            include_extensionless: false,
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["go", "txt", "js", "py"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(workers) = args.workers {
            self.pipeline.workers = workers;
        }
        if let Some(chunk_size) = args.chunk_size {
            self.pipeline.chunk_size = chunk_size;
        }
        if let Some(capacity) = args.queue_capacity {
            self.pipeline.queue_capacity = capacity;
        }
        if let Some(strategy) = args.strategy {
            self.pipeline.strategy = strategy;
        }

        if let Some(ref extensions) = args.extensions {
            self.scanner.extensions = extensions.clone();
        }
        if let Some(ref excludes) = args.exclude {
            self.scanner.excludes = excludes.clone();
        }
        if args.include_extensionless {
            self.scanner.include_extensionless = true;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
    }

    /// Check values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be at least 1");
        }
        if self.pipeline.chunk_size == 0 {
            anyhow::bail!("pipeline.chunk_size must be at least 1");
        }
        if self.scanner.extensions.is_empty() && !self.scanner.include_extensionless {
            anyhow::bail!("scanner.extensions is empty; nothing would be scanned");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

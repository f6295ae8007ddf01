//! bytefreq - concurrent byte-frequency scanner
//!
//! Walks a directory tree, reads matching files through a bounded worker
//! pool and tallies how often each byte value occurs.
//!
//! Exit codes:
//!   0 - Success, or no root given (usage is printed)
//!   1 - Configuration error, I/O error, or a scan that ended with a
//!       pipeline error (partial results are still printed and written)

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod report;
mod scanner;

use analysis::TableSummary;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use models::{Report, ReportMetadata, ScanReport};
use pipeline::{Pipeline, PipelineConfig};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let Some(root) = args.root.clone() else {
        println!("{}", Args::usage());
        return Ok(());
    };

    // Initialize logging
    init_logging(&args);

    info!("bytefreq v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_scan(args, root).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Scan failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .bytefreq.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE);
    println!("   Edit it to customize workers, chunk size, extensions, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the scan and write its outputs. Returns the exit code.
async fn run_scan(args: Args, root: PathBuf) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let pipeline_config = PipelineConfig::from(&config);

    if args.dry_run {
        return handle_dry_run(&root, &pipeline_config);
    }

    println!("📂 Scanning: {}", root.display());
    println!(
        "   Workers: {} | Chunk: {} bytes | Queue: {} | Aggregation: {:?}",
        pipeline_config.workers,
        pipeline_config.chunk_size,
        pipeline_config.queue_capacity,
        pipeline_config.strategy
    );

    let pipeline = Pipeline::new(pipeline_config.clone());

    let cancel = pipeline.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling scan");
            cancel.cancel();
        }
    });

    let progress = (!args.quiet).then(|| spawn_progress(&pipeline));

    let scan = pipeline.run(root.clone()).await;

    interrupt.abort();
    if let Some((bar, ticker)) = progress {
        ticker.abort();
        bar.finish_and_clear();
    }

    let summary = TableSummary::from_table(&scan.table);
    print_summary(&scan, &summary);

    if !args.no_write {
        let report = build_report(&root, &pipeline_config, &scan, summary);
        write_outputs(&report, Path::new(&config.general.output), args.format)?;
    }

    println!("   Total time: {:.2?}", start_time.elapsed());

    if scan.is_complete() {
        println!("\n✅ Scan complete.");
        return Ok(0);
    }

    match scan.error {
        Some(e) if e.is_cancellation() => {
            warn!("Scan cancelled before completion");
            eprintln!("\n⛔ Scan cancelled. Results are partial.");
        }
        Some(e) => {
            error!("Scan ended early: {}", e);
            eprintln!("\n⛔ Results are partial: {}", e);
        }
        None => {}
    }
    Ok(1)
}

/// Show a spinner with live counters while the pipeline runs.
fn spawn_progress(pipeline: &Pipeline) -> (ProgressBar, tokio::task::JoinHandle<()>) {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(100));

    let stats = pipeline.stats();
    let ticker_bar = bar.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(200));
        loop {
            interval.tick().await;
            let snapshot = stats.snapshot();
            ticker_bar.set_message(format!(
                "{}/{} files, {} bytes",
                stats.files_done(),
                snapshot.files_matched,
                snapshot.bytes_read
            ));
        }
    });

    (bar, ticker)
}

/// Print the run summary to stdout.
fn print_summary(scan: &ScanReport, summary: &TableSummary) {
    println!("\n📊 Scan Summary:");
    println!(
        "   Files: {} scanned, {} failed, {} matched",
        scan.stats.files_scanned, scan.stats.files_failed, scan.stats.files_matched
    );
    println!("   Bytes read: {}", scan.stats.bytes_read);
    if scan.table.is_empty() {
        println!("   No bytes were observed.");
        return;
    }
    for line in analysis::generate_summary_text(summary).lines() {
        println!("   {}", line);
    }
    println!("   Scan time: {:.2?}", scan.elapsed);
}

fn build_report(
    root: &Path,
    config: &PipelineConfig,
    scan: &ScanReport,
    summary: TableSummary,
) -> Report {
    let metadata = ReportMetadata {
        root: root.display().to_string(),
        analysis_date: Utc::now(),
        workers: config.workers,
        chunk_size: config.chunk_size,
        strategy: format!("{:?}", config.strategy).to_lowercase(),
        stats: scan.stats,
        duration_seconds: scan.elapsed.as_secs_f64(),
        error: scan.error.as_ref().map(ToString::to_string),
    };

    Report {
        metadata,
        summary,
        symbols: scan.table.clone(),
    }
}

/// Write the report and the symbols JSON next to it.
fn write_outputs(report: &Report, output: &Path, format: OutputFormat) -> Result<()> {
    let content = match format {
        OutputFormat::Json => report::generate_json_report(report)?,
        OutputFormat::Markdown => report::generate_markdown_report(report),
    };

    std::fs::write(output, &content)
        .with_context(|| format!("Failed to write report to {}", output.display()))?;
    println!("\n📝 Report saved to: {}", output.display());

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let seed = report.metadata.analysis_date.timestamp();
    let symbols = report::write_symbols_json(&report.symbols, dir, seed)?;
    println!("   Symbols saved to: {}", symbols.display());

    Ok(())
}

/// Handle --dry-run: list the files that would be scanned, exit.
fn handle_dry_run(root: &Path, config: &PipelineConfig) -> Result<i32> {
    println!("\n🔍 Dry run: walking {} (no files are read)...\n", root.display());

    let file_scanner = scanner::FileScanner::new(root.to_path_buf(), config.scan.clone());
    let files = file_scanner.scan()?;

    if files.is_empty() {
        println!("   No matching files found.");
    } else {
        for file in &files {
            println!("     📄 {}", file.display());
        }
        println!("\n   Total: {} files", files.len());
    }

    println!("\n✅ Dry run complete.");
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

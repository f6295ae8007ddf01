//! Report generation.
//!
//! Markdown reports carry two text bar charts over the byte values: one
//! linear, one log2-scaled. JSON reports are the serialized [`Report`].

use crate::analysis::{byte_label, generate_summary_text, log2_frequencies, share, top_values};
use crate::models::{FrequencyTable, Report, ReportMetadata};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Width of the longest bar in a chart, in characters.
const BAR_WIDTH: usize = 50;

/// Rows in the "most common" table.
const TOP_N: usize = 10;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Byte Frequency Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(report));

    let linear: Vec<(String, f64)> = report
        .symbols
        .iter()
        .map(|(value, count)| (byte_label(value), count as f64))
        .collect();
    output.push_str(&generate_chart_section("Frequency", &linear));

    let log2: Vec<(String, f64)> = log2_frequencies(&report.symbols)
        .into_iter()
        .map(|(value, log)| (byte_label(value), log))
        .collect();
    output.push_str(&generate_chart_section("Log2 Frequency", &log2));

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Root:** `{}`\n", metadata.root));
    section.push_str(&format!(
        "- **Scan Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Workers:** {} | **Chunk Size:** {} bytes | **Aggregation:** {}\n",
        metadata.workers, metadata.chunk_size, metadata.strategy
    ));
    section.push_str(&format!(
        "- **Files Scanned:** {} of {}\n",
        metadata.stats.files_scanned, metadata.stats.files_matched
    ));
    if metadata.stats.files_failed > 0 {
        section.push_str(&format!(
            "- **Files Failed:** {}\n",
            metadata.stats.files_failed
        ));
    }
    section.push_str(&format!("- **Bytes Read:** {}\n", metadata.stats.bytes_read));
    section.push_str(&format!(
        "- **Scan Duration:** {:.3}s\n",
        metadata.duration_seconds
    ));
    if let Some(ref error) = metadata.error {
        section.push_str(&format!("- **Partial Results:** {}\n", error));
    }
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(report: &Report) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n```\n");
    section.push_str(&generate_summary_text(&report.summary));
    section.push_str("\n```\n\n");

    let top = top_values(&report.symbols, TOP_N);
    if !top.is_empty() {
        section.push_str("### Most Common Values\n\n");
        section.push_str("| Value | Byte | Count | Share |\n");
        section.push_str("|:---|:---:|---:|---:|\n");

        for (value, count) in top {
            section.push_str(&format!(
                "| `{}` | {} | {} | {:.2}% |\n",
                byte_label(value),
                value,
                count,
                share(count, report.summary.total)
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate one bar chart section.
fn generate_chart_section(title: &str, bars: &[(String, f64)]) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", title));

    if bars.is_empty() {
        section.push_str("No values were observed.\n\n");
        return section;
    }

    section.push_str("```\n");
    section.push_str(&render_bars(bars, BAR_WIDTH));
    section.push_str("```\n\n");

    section
}

/// Render labelled horizontal bars scaled so the largest is `width` wide.
pub fn render_bars(bars: &[(String, f64)], width: usize) -> String {
    let max = bars.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let label_width = bars.iter().map(|(l, _)| l.len()).max().unwrap_or(0);

    let mut out = String::new();
    for (label, value) in bars {
        let len = if max > 0.0 {
            ((value / max) * width as f64).round() as usize
        } else {
            0
        };
        out.push_str(&format!(
            "{:>lw$} | {} {}\n",
            label,
            "#".repeat(len),
            format_value(*value),
            lw = label_width
        ));
    }
    out
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as u64)
    } else {
        format!("{:.2}", value)
    }
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by bytefreq*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write the bare table as `symbols_<seed>.json` inside `dir`.
pub fn write_symbols_json(table: &FrequencyTable, dir: &Path, seed: i64) -> Result<PathBuf> {
    let path = dir.join(format!("symbols_{}.json", seed));
    let content = serde_json::to_string_pretty(table)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write symbols to {}", path.display()))?;
    Ok(path)
}

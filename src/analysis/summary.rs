//! Frequency statistics.
//!
//! This module provides utilities for summarizing a finished frequency
//! table: rankings, shares, log-scaled values and display labels.

use crate::models::{FrequencyTable, Observation};
use serde::{Deserialize, Serialize};

/// Summary of a frequency table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    /// Total number of observations.
    pub total: u64,
    /// Number of distinct byte values.
    pub distinct: usize,
    /// Most frequent value and its count.
    pub most_common: Option<(Observation, u64)>,
    /// Least frequent value and its count.
    pub least_common: Option<(Observation, u64)>,
    /// Observations in the printable ASCII range (0x20..=0x7e).
    pub printable: u64,
    /// Observations that are ASCII whitespace.
    pub whitespace: u64,
    /// Observations with the high bit set (non-ASCII).
    pub non_ascii: u64,
}

impl TableSummary {
    /// Creates a summary from a table.
    pub fn from_table(table: &FrequencyTable) -> Self {
        let mut summary = Self {
            total: table.total(),
            distinct: table.len(),
            ..Self::default()
        };

        for (value, count) in table.iter() {
            if (0x20..=0x7e).contains(&value) {
                summary.printable += count;
            }
            if value.is_ascii_whitespace() {
                summary.whitespace += count;
            }
            if !value.is_ascii() {
                summary.non_ascii += count;
            }

            // Ties go to the lower byte value.
            if summary.most_common.map_or(true, |(_, best)| count > best) {
                summary.most_common = Some((value, count));
            }
            if summary.least_common.map_or(true, |(_, worst)| count < worst) {
                summary.least_common = Some((value, count));
            }
        }

        summary
    }
}

/// Values sorted by count (highest first), ties broken by byte value.
pub fn ranked(table: &FrequencyTable) -> Vec<(Observation, u64)> {
    let mut values: Vec<_> = table.iter().collect();
    values.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    values
}

/// Get the top N values by count.
pub fn top_values(table: &FrequencyTable, n: usize) -> Vec<(Observation, u64)> {
    let mut values = ranked(table);
    values.truncate(n);
    values
}

/// Fraction of `total` represented by `count`, as a percentage.
pub fn share(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// `log2` of every counter, in ascending value order.
pub fn log2_frequencies(table: &FrequencyTable) -> Vec<(Observation, f64)> {
    table
        .iter()
        .map(|(value, count)| (value, (count as f64).log2()))
        .collect()
}

/// Human-readable label for a byte value.
pub fn byte_label(value: Observation) -> String {
    match value {
        b' ' => "space".to_string(),
        b'\n' => "\\n".to_string(),
        b'\r' => "\\r".to_string(),
        b'\t' => "\\t".to_string(),
        0x21..=0x7e => (value as char).to_string(),
        _ => format!("0x{:02x}", value),
    }
}

/// Generate a text summary of table statistics.
pub fn generate_summary_text(summary: &TableSummary) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Total observations: {}", summary.total));
    lines.push(format!("Distinct values: {}", summary.distinct));

    if let Some((value, count)) = summary.most_common {
        lines.push(format!(
            "Most common: {} ({}, {:.2}%)",
            byte_label(value),
            count,
            share(count, summary.total)
        ));
    }
    if let Some((value, count)) = summary.least_common {
        lines.push(format!(
            "Least common: {} ({}, {:.2}%)",
            byte_label(value),
            count,
            share(count, summary.total)
        ));
    }

    lines.push(format!(
        "Printable: {:.2}% | Whitespace: {:.2}% | Non-ASCII: {:.2}%",
        share(summary.printable, summary.total),
        share(summary.whitespace, summary.total),
        share(summary.non_ascii, summary.total)
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(bytes: &[u8]) -> FrequencyTable {
        let mut table = FrequencyTable::new();
        table.record_all(bytes);
        table
    }

    #[test]
    fn test_summary_counts() {
        let table = table_of(b"aab bbc\n\xff");
        let summary = TableSummary::from_table(&table);

        assert_eq!(summary.total, 9);
        assert_eq!(summary.distinct, 6);
        assert_eq!(summary.most_common, Some((b'b', 3)));
        assert_eq!(summary.least_common, Some((b'\n', 1)));
        assert_eq!(summary.printable, 7);
        assert_eq!(summary.whitespace, 2);
        assert_eq!(summary.non_ascii, 1);
    }

    #[test]
    fn test_empty_summary() {
        let summary = TableSummary::from_table(&FrequencyTable::new());
        assert_eq!(summary.total, 0);
        assert!(summary.most_common.is_none());
        assert!(generate_summary_text(&summary).contains("Total observations: 0"));
    }

    #[test]
    fn test_ranked_breaks_ties_by_value() {
        let table = table_of(b"ccbbaad");
        let top = top_values(&table, 3);
        assert_eq!(top, vec![(b'a', 2), (b'b', 2), (b'c', 2)]);
    }

    #[test]
    fn test_share_handles_zero_total() {
        assert_eq!(share(5, 0), 0.0);
        assert_eq!(share(1, 4), 25.0);
    }

    #[test]
    fn test_log2_frequencies() {
        let table = table_of(b"aaaab");
        let logs = log2_frequencies(&table);
        assert_eq!(logs, vec![(b'a', 2.0), (b'b', 0.0)]);
    }

    #[test]
    fn test_byte_label() {
        assert_eq!(byte_label(b'a'), "a");
        assert_eq!(byte_label(b' '), "space");
        assert_eq!(byte_label(b'\n'), "\\n");
        assert_eq!(byte_label(0), "0x00");
        assert_eq!(byte_label(0xe9), "0xe9");
    }
}

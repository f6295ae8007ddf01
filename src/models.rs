//! Data models for the byte-frequency scanner.
//!
//! This module contains the values that flow through the pipeline and the
//! structures handed back to the caller once it has drained.

use crate::analysis::TableSummary;
use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A single byte value read from a matched file.
pub type Observation = u8;

/// One file waiting to be scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    path: PathBuf,
}

impl WorkItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Occurrence count per byte value.
///
/// Serializes as a JSON object keyed by the decimal byte value, in
/// ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyTable {
    counts: BTreeMap<Observation, u64>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one observation. Unseen values start at 1.
    pub fn record(&mut self, value: Observation) {
        *self.counts.entry(value).or_insert(0) += 1;
    }

    /// Count every byte of a chunk.
    pub fn record_all(&mut self, chunk: &[Observation]) {
        for &value in chunk {
            self.record(value);
        }
    }

    #[cfg(test)]
    pub fn get(&self, value: Observation) -> u64 {
        self.counts.get(&value).copied().unwrap_or(0)
    }

    /// Number of distinct values seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Iterate `(value, count)` pairs in ascending value order.
    pub fn iter(&self) -> impl Iterator<Item = (Observation, u64)> + '_ {
        self.counts.iter().map(|(&value, &count)| (value, count))
    }
}

impl FromIterator<(Observation, u64)> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item = (Observation, u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

/// Counters collected while the pipeline runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Paths the walker handed to the workers.
    pub files_matched: u64,
    /// Files read through to end-of-stream.
    pub files_scanned: u64,
    /// Files abandoned on an open or read error.
    pub files_failed: u64,
    /// Bytes successfully read and observed.
    pub bytes_read: u64,
}

/// Shared atomic counterpart of [`ScanStats`], updated by the walker and
/// the workers.
#[derive(Debug, Default)]
pub struct StatsCounters {
    files_matched: AtomicU64,
    files_scanned: AtomicU64,
    files_failed: AtomicU64,
    bytes_read: AtomicU64,
}

impl StatsCounters {
    pub fn file_matched(&self) {
        self.files_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_scanned(&self) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    /// Files finished either way, used for progress display.
    pub fn files_done(&self) -> u64 {
        self.files_scanned.load(Ordering::Relaxed) + self.files_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ScanStats {
        ScanStats {
            files_matched: self.files_matched.load(Ordering::Relaxed),
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

/// Everything a finished pipeline run hands back.
///
/// `table` is populated even when `error` is set; results are best-effort.
#[derive(Debug)]
pub struct ScanReport {
    pub table: FrequencyTable,
    pub stats: ScanStats,
    pub elapsed: Duration,
    pub error: Option<PipelineError>,
}

impl ScanReport {
    /// Returns true when the run finished without a pipeline error.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Metadata about a written report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Directory that was scanned.
    pub root: String,
    /// Date and time of the scan.
    pub analysis_date: DateTime<Utc>,
    /// Worker tasks used.
    pub workers: usize,
    /// Bytes requested per read.
    pub chunk_size: usize,
    /// Aggregation strategy name.
    pub strategy: String,
    /// Pipeline counters.
    pub stats: ScanStats,
    /// Duration of the scan in seconds.
    pub duration_seconds: f64,
    /// Terminal pipeline error, if the results are partial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The complete frequency report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Metadata about the report.
    pub metadata: ReportMetadata,
    /// Summary statistics of the table.
    pub summary: TableSummary,
    /// The frequency table itself.
    pub symbols: FrequencyTable,
}

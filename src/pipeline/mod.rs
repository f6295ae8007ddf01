//! The scanning pipeline.
//!
//! Walker → paths queue → worker pool → aggregator. The coordinator in
//! [`Pipeline::run_with`] joins the workers, closes the aggregator's input,
//! collects the table and only then looks at the walker's terminal result.

pub mod aggregator;
pub mod worker;

pub use aggregator::{Aggregator, ChannelAggregator, LockedAggregator};

use crate::error::PipelineError;
use crate::models::{FrequencyTable, ScanReport, StatsCounters};
use crate::scanner::{spawn_walker, FileScanner, ScanConfig};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use worker::Worker;

/// How worker output is merged into the table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStrategy {
    /// One consumer task owns the table and drains a bounded queue
    #[default]
    Channel,
    /// Workers merge chunks into a mutex-guarded table
    Locked,
}

/// Pipeline tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    /// Bytes requested per read.
    pub chunk_size: usize,
    /// Observation queue slots (channel strategy only).
    pub queue_capacity: usize,
    /// Paths queue slots between walker and workers.
    pub path_queue_capacity: usize,
    pub strategy: AggregationStrategy,
    pub scan: ScanConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            chunk_size: 100,
            queue_capacity: 1000,
            path_queue_capacity: 1,
            strategy: AggregationStrategy::Channel,
            scan: ScanConfig::default(),
        }
    }
}

impl From<&crate::config::Config> for PipelineConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            workers: config.pipeline.workers,
            chunk_size: config.pipeline.chunk_size,
            queue_capacity: config.pipeline.queue_capacity,
            path_queue_capacity: config.pipeline.path_queue_capacity,
            strategy: config.pipeline.strategy,
            scan: ScanConfig::from(&config.scanner),
        }
    }
}

/// One configured scan, with its cancellation signal and live counters.
pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancellationToken,
    stats: Arc<StatsCounters>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            stats: Arc::new(StatsCounters::default()),
        }
    }

    /// Token that aborts the scan when cancelled. Cancelling is idempotent.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Live counters, readable while the scan runs.
    pub fn stats(&self) -> Arc<StatsCounters> {
        Arc::clone(&self.stats)
    }

    /// Scan `root` with the configured aggregation strategy.
    pub async fn run(&self, root: PathBuf) -> ScanReport {
        match self.config.strategy {
            AggregationStrategy::Channel => {
                self.run_with(root, ChannelAggregator::spawn(self.config.queue_capacity))
                    .await
            }
            AggregationStrategy::Locked => self.run_with(root, LockedAggregator::new()).await,
        }
    }

    /// Scan `root`, merging observations through `aggregator`.
    ///
    /// Always returns the table built so far. A traversal error takes
    /// precedence over worker failures, which take precedence over plain
    /// cancellation.
    pub async fn run_with<A: Aggregator>(&self, root: PathBuf, aggregator: A) -> ScanReport {
        let start = Instant::now();
        let workers = self.config.workers.max(1);
        info!(
            "Scanning {} with {} workers ({} aggregation)",
            root.display(),
            workers,
            aggregator.name()
        );

        let (path_tx, path_rx) = mpsc::channel(self.config.path_queue_capacity.max(1));
        let scanner = FileScanner::new(root, self.config.scan.clone());
        let walker = spawn_walker(scanner, path_tx, self.cancel.clone(), self.stats());

        let path_rx = Arc::new(Mutex::new(path_rx));
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&path_rx),
                    aggregator.sink(),
                    self.cancel.clone(),
                    self.stats(),
                    self.config.chunk_size,
                );
                tokio::spawn(worker.run())
            })
            .collect();
        drop(path_rx);

        let mut failure: Option<PipelineError> = None;
        for joined in join_all(handles).await {
            let err = match joined {
                Ok(Ok(exit)) => {
                    debug!("worker exit: {:?}", exit);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(source) => PipelineError::TaskFailed {
                    task: "worker",
                    source,
                },
            };
            // Stop the rest of the pool; the first failure wins.
            self.cancel.cancel();
            keep_first(&mut failure, err);
        }

        // Every sink is gone now, so closing the queue cannot race a send.
        let table = match aggregator.finish().await {
            Ok(table) => table,
            Err(e) => {
                keep_first(&mut failure, e);
                FrequencyTable::new()
            }
        };

        let walk_error = match walker.await {
            Ok(Ok(summary)) => {
                debug!("walker summary: {:?}", summary);
                None
            }
            Ok(Err(e)) => Some(e),
            Err(source) => Some(PipelineError::TaskFailed {
                task: "walker",
                source,
            }),
        };

        let error = reported_error(walk_error, failure, self.cancel.is_cancelled());

        let stats = self.stats.snapshot();
        let elapsed = start.elapsed();
        info!(
            "Scan finished in {:.2?}: {} files, {} bytes, {} distinct values",
            elapsed,
            stats.files_scanned,
            stats.bytes_read,
            table.len()
        );

        ScanReport {
            table,
            stats,
            elapsed,
            error,
        }
    }
}

/// Traversal error first, then worker or aggregator failure, then plain
/// cancellation.
fn reported_error(
    walk: Option<PipelineError>,
    failure: Option<PipelineError>,
    cancelled: bool,
) -> Option<PipelineError> {
    match (walk, failure) {
        (Some(walk), Some(other)) => {
            warn!("Also failed: {}", other);
            Some(walk)
        }
        (walk, other) => walk.or(other),
    }
    .or_else(|| cancelled.then_some(PipelineError::Cancelled))
}

fn keep_first(slot: &mut Option<PipelineError>, err: PipelineError) {
    match slot {
        Some(first) => warn!("Additional pipeline failure after {}: {}", first, err),
        None => *slot = Some(err),
    }
}

//! Worker tasks: read matched files in fixed-size chunks and forward every
//! byte to the aggregator.

use super::aggregator::{Forwarded, ObservationSink};
use crate::error::PipelineError;
use crate::models::{StatsCounters, WorkItem};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Paths queue shared by all workers.
pub type SharedPaths = Arc<Mutex<mpsc::Receiver<WorkItem>>>;

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The paths queue was closed and drained.
    Drained,
    /// The cancellation signal fired.
    Cancelled,
}

enum FileOutcome {
    Scanned,
    Failed,
    Cancelled,
}

pub struct Worker<S> {
    id: usize,
    paths: SharedPaths,
    sink: S,
    cancel: CancellationToken,
    stats: Arc<StatsCounters>,
    chunk_size: usize,
}

impl<S: ObservationSink> Worker<S> {
    pub fn new(
        id: usize,
        paths: SharedPaths,
        sink: S,
        cancel: CancellationToken,
        stats: Arc<StatsCounters>,
        chunk_size: usize,
    ) -> Self {
        Self {
            id,
            paths,
            sink,
            cancel,
            stats,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Process work items until the queue is drained or the scan is
    /// cancelled. The sink is dropped on return.
    pub async fn run(mut self) -> Result<WorkerExit, PipelineError> {
        debug!("worker {} started", self.id);
        let mut buf = vec![0u8; self.chunk_size];

        let exit = loop {
            let Some(item) = next_item(&self.paths, &self.cancel).await else {
                break if self.cancel.is_cancelled() {
                    WorkerExit::Cancelled
                } else {
                    WorkerExit::Drained
                };
            };

            debug!("worker {}: {}", self.id, item.path().display());
            match self.scan_file(&item, &mut buf).await? {
                FileOutcome::Scanned => self.stats.file_scanned(),
                FileOutcome::Failed => self.stats.file_failed(),
                FileOutcome::Cancelled => break WorkerExit::Cancelled,
            }
        };

        debug!("worker {} finished: {:?}", self.id, exit);
        Ok(exit)
    }

    /// Read one file chunk by chunk. Open and read errors abandon this file
    /// only; the handle is dropped on every return.
    async fn scan_file(
        &mut self,
        item: &WorkItem,
        buf: &mut [u8],
    ) -> Result<FileOutcome, PipelineError> {
        let mut file = match File::open(item.path()).await {
            Ok(file) => file,
            Err(e) => {
                warn!("Failed to open {}: {}", item.path().display(), e);
                return Ok(FileOutcome::Failed);
            }
        };

        loop {
            let n = match file.read(buf).await {
                Ok(0) => return Ok(FileOutcome::Scanned),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Failed to read {}: {}", item.path().display(), e);
                    return Ok(FileOutcome::Failed);
                }
            };

            match self.sink.forward(&buf[..n], &self.cancel).await {
                Forwarded::Delivered => self.stats.add_bytes(n as u64),
                Forwarded::Cancelled => return Ok(FileOutcome::Cancelled),
                Forwarded::Closed => {
                    error!(
                        "worker {}: observation queue closed mid-scan of {}",
                        self.id,
                        item.path().display()
                    );
                    return Err(PipelineError::ObservationQueueClosed { worker: self.id });
                }
            }
        }
    }
}

/// Take the next path, or `None` once the queue is closed and empty or the
/// scan is cancelled.
/// Must not borrow the worker itself: sinks are only required to be `Send`.
async fn next_item(paths: &SharedPaths, cancel: &CancellationToken) -> Option<WorkItem> {
    let mut paths = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        paths = paths.lock() => paths,
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = paths.recv() => item,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregator::{Aggregator, ChannelAggregator, LockedAggregator};
    use std::fs;
    use tempfile::TempDir;

    async fn queue_of(paths: Vec<std::path::PathBuf>) -> SharedPaths {
        let (tx, rx) = mpsc::channel(paths.len().max(1));
        for path in paths {
            tx.send(WorkItem::new(path)).await.unwrap();
        }
        Arc::new(Mutex::new(rx))
    }

    #[tokio::test]
    async fn test_worker_counts_only_bytes_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.txt");
        fs::write(&path, "abcde").unwrap();

        let aggregator = ChannelAggregator::spawn(16);
        let stats = Arc::new(StatsCounters::default());
        // Chunk larger than the file: the tail of the buffer must not count.
        let worker = Worker::new(
            0,
            queue_of(vec![path]).await,
            aggregator.sink(),
            CancellationToken::new(),
            stats.clone(),
            100,
        );

        assert_eq!(worker.run().await.unwrap(), WorkerExit::Drained);
        let table = aggregator.finish().await.unwrap();
        assert_eq!(table.total(), 5);
        assert_eq!(table.get(0), 0);
        assert_eq!(stats.snapshot().bytes_read, 5);
        assert_eq!(stats.snapshot().files_scanned, 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_does_not_stop_worker() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.txt");
        fs::write(&good, "ok").unwrap();
        let missing = dir.path().join("vanished.txt");

        let aggregator = LockedAggregator::new();
        let stats = Arc::new(StatsCounters::default());
        let worker = Worker::new(
            1,
            queue_of(vec![missing, good]).await,
            aggregator.sink(),
            CancellationToken::new(),
            stats.clone(),
            1,
        );

        assert_eq!(worker.run().await.unwrap(), WorkerExit::Drained);
        let table = aggregator.finish().await.unwrap();
        assert_eq!(table.get(b'o'), 1);
        assert_eq!(table.get(b'k'), 1);

        let stats = stats.snapshot();
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.files_scanned, 1);
    }

    #[tokio::test]
    async fn test_cancelled_worker_exits() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        // The queue is never closed, so only cancellation can end the worker.
        let (_tx, rx) = mpsc::channel::<WorkItem>(1);
        let worker = Worker::new(
            2,
            Arc::new(Mutex::new(rx)),
            LockedAggregator::new().sink(),
            cancel,
            Arc::new(StatsCounters::default()),
            8,
        );

        assert_eq!(worker.run().await.unwrap(), WorkerExit::Cancelled);
    }

    struct ClosedSink;

    #[async_trait::async_trait]
    impl ObservationSink for ClosedSink {
        async fn forward(&mut self, _: &[u8], _: &CancellationToken) -> Forwarded {
            Forwarded::Closed
        }
    }

    #[tokio::test]
    async fn test_closed_observation_queue_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();

        let worker = Worker::new(
            3,
            queue_of(vec![path]).await,
            ClosedSink,
            CancellationToken::new(),
            Arc::new(StatsCounters::default()),
            4,
        );

        match worker.run().await {
            Err(PipelineError::ObservationQueueClosed { worker }) => assert_eq!(worker, 3),
            other => panic!("expected closed queue error, got {:?}", other),
        }
    }

    /// Sink that is `Send` but not `Sync`.
    struct CellSink {
        seen: std::cell::Cell<u64>,
    }

    #[async_trait::async_trait]
    impl ObservationSink for CellSink {
        async fn forward(&mut self, chunk: &[u8], _: &CancellationToken) -> Forwarded {
            self.seen.set(self.seen.get() + chunk.len() as u64);
            Forwarded::Delivered
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_with_unsync_sink_can_be_spawned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();

        let stats = Arc::new(StatsCounters::default());
        let worker = Worker::new(
            4,
            queue_of(vec![path]).await,
            CellSink {
                seen: std::cell::Cell::new(0),
            },
            CancellationToken::new(),
            stats.clone(),
            2,
        );

        let exit = tokio::spawn(worker.run()).await.unwrap().unwrap();
        assert_eq!(exit, WorkerExit::Drained);
        assert_eq!(stats.snapshot().bytes_read, 3);
    }
}

//! Aggregation strategies.
//!
//! Workers never touch the frequency table directly; they push chunks into
//! an [`ObservationSink`] handed out by an [`Aggregator`]. Two strategies
//! exist:
//!
//! - [`ChannelAggregator`]: a bounded queue drained by one consumer task
//!   that owns the table outright. This is the default.
//! - [`LockedAggregator`]: the table sits behind a mutex and each worker
//!   merges whole chunks under the lock.
//!
//! Both produce the same table for the same input.

use crate::error::PipelineError;
use crate::models::{FrequencyTable, Observation};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of forwarding one chunk downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarded {
    /// Every observation in the chunk was accepted.
    Delivered,
    /// Cancellation fired before the chunk was fully accepted.
    Cancelled,
    /// The downstream side is gone. Never expected while workers run.
    Closed,
}

/// Worker-side handle for pushing observations.
#[async_trait]
pub trait ObservationSink: Send + 'static {
    async fn forward(&mut self, chunk: &[Observation], cancel: &CancellationToken) -> Forwarded;
}

/// A way of turning observations from many workers into one table.
#[async_trait]
pub trait Aggregator: Send + Sized + 'static {
    type Sink: ObservationSink;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Hand out a sink for one worker.
    fn sink(&self) -> Self::Sink;

    /// Close the input side and return the finished table.
    ///
    /// Must only be called once every sink handed out has been dropped.
    async fn finish(self) -> Result<FrequencyTable, PipelineError>;
}

/// Dedicated single-consumer aggregation over a bounded queue.
pub struct ChannelAggregator {
    tx: mpsc::Sender<Observation>,
    consumer: JoinHandle<FrequencyTable>,
}

impl ChannelAggregator {
    /// Spawn the consumer task with a queue of `capacity` slots.
    ///
    /// Tokio channels need at least one slot, so 0 is treated as 1.
    pub fn spawn(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let consumer = tokio::spawn(drain(rx));
        Self { tx, consumer }
    }
}

/// Drain `rx` until it is closed and empty, counting every observation.
pub async fn drain(mut rx: mpsc::Receiver<Observation>) -> FrequencyTable {
    let mut table = FrequencyTable::new();
    while let Some(value) = rx.recv().await {
        table.record(value);
    }
    debug!("Aggregator finished: {} distinct values", table.len());
    table
}

#[async_trait]
impl Aggregator for ChannelAggregator {
    type Sink = ChannelSink;

    fn name(&self) -> &'static str {
        "channel"
    }

    fn sink(&self) -> ChannelSink {
        ChannelSink {
            tx: self.tx.clone(),
        }
    }

    async fn finish(self) -> Result<FrequencyTable, PipelineError> {
        // Dropping the last sender closes the queue.
        drop(self.tx);
        self.consumer
            .await
            .map_err(|source| PipelineError::TaskFailed {
                task: "aggregator",
                source,
            })
    }
}

/// Sender half given to each worker by [`ChannelAggregator`].
pub struct ChannelSink {
    tx: mpsc::Sender<Observation>,
}

#[async_trait]
impl ObservationSink for ChannelSink {
    async fn forward(&mut self, chunk: &[Observation], cancel: &CancellationToken) -> Forwarded {
        if cancel.is_cancelled() {
            return Forwarded::Cancelled;
        }

        for &value in chunk {
            let value = match self.tx.try_send(value) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Closed(_)) => return Forwarded::Closed,
                Err(mpsc::error::TrySendError::Full(value)) => value,
            };

            // Queue is full: wait for room or for cancellation.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Forwarded::Cancelled,
                sent = self.tx.send(value) => {
                    if sent.is_err() {
                        return Forwarded::Closed;
                    }
                }
            }
        }

        Forwarded::Delivered
    }
}

/// Lock-guarded shared table.
#[derive(Default)]
pub struct LockedAggregator {
    table: Arc<Mutex<FrequencyTable>>,
}

impl LockedAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Aggregator for LockedAggregator {
    type Sink = LockedSink;

    fn name(&self) -> &'static str {
        "locked"
    }

    fn sink(&self) -> LockedSink {
        LockedSink {
            table: Arc::clone(&self.table),
        }
    }

    async fn finish(self) -> Result<FrequencyTable, PipelineError> {
        let table = match Arc::try_unwrap(self.table) {
            Ok(table) => table.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        };
        debug!("Aggregator finished: {} distinct values", table.len());
        Ok(table)
    }
}

/// Shared-table handle given to each worker by [`LockedAggregator`].
pub struct LockedSink {
    table: Arc<Mutex<FrequencyTable>>,
}

#[async_trait]
impl ObservationSink for LockedSink {
    async fn forward(&mut self, chunk: &[Observation], cancel: &CancellationToken) -> Forwarded {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Forwarded::Cancelled,
            mut table = self.table.lock() => {
                table.record_all(chunk);
                Forwarded::Delivered
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_waits_for_close() {
        let (tx, rx) = mpsc::channel(4);
        let consumer = tokio::spawn(drain(rx));

        for &b in b"aab" {
            tx.send(b).await.unwrap();
        }
        // Momentarily empty is not the end.
        tokio::task::yield_now().await;
        for &b in b"bbc" {
            tx.send(b).await.unwrap();
        }
        drop(tx);

        let table = consumer.await.unwrap();
        assert_eq!(table.get(b'a'), 2);
        assert_eq!(table.get(b'b'), 3);
        assert_eq!(table.get(b'c'), 1);
    }

    #[tokio::test]
    async fn test_channel_aggregator_collects_from_many_sinks() {
        let aggregator = ChannelAggregator::spawn(1);
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for chunk in [b"aab".to_vec(), b"bbc".to_vec()] {
            let mut sink = aggregator.sink();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                sink.forward(&chunk, &cancel).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Forwarded::Delivered);
        }

        let table = aggregator.finish().await.unwrap();
        assert_eq!(table.total(), 6);
        assert_eq!(table.get(b'b'), 3);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_queue() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = ChannelSink { tx };
        let outcome = sink.forward(b"x", &CancellationToken::new()).await;
        assert_eq!(outcome, Forwarded::Closed);
    }

    #[tokio::test]
    async fn test_channel_sink_unblocks_on_cancel() {
        let (tx, _rx) = mpsc::channel(1);
        let mut sink = ChannelSink { tx };
        let cancel = CancellationToken::new();

        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { sink.forward(b"abc", &cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Forwarded::Cancelled);
    }

    #[tokio::test]
    async fn test_locked_aggregator_matches_channel() {
        let cancel = CancellationToken::new();

        let locked = LockedAggregator::new();
        let mut sink = locked.sink();
        sink.forward(b"hello world", &cancel).await;
        drop(sink);
        let from_locked = locked.finish().await.unwrap();

        let channel = ChannelAggregator::spawn(1000);
        let mut sink = channel.sink();
        sink.forward(b"hello world", &cancel).await;
        drop(sink);
        let from_channel = channel.finish().await.unwrap();

        assert_eq!(from_locked, from_channel);
        assert_eq!(from_locked.get(b'l'), 3);
    }
}

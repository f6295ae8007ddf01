//! Pipeline error types.
//!
//! Only pipeline-level failures live here. Per-file open/read errors are
//! logged and counted by the workers and never reach the caller as errors.

use std::path::PathBuf;
use thiserror::Error;

/// Terminal error reported by a pipeline run.
///
/// The run still returns whatever was aggregated before the error, so this
/// is carried next to the table rather than instead of it.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The directory walk failed (missing root, unreadable directory, ...).
    #[error("traversal failed at {}: {source}", path.display())]
    Traversal {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The cancellation signal was raised before the pipeline finished.
    #[error("scan cancelled")]
    Cancelled,

    /// A worker tried to send after the observation queue was closed.
    #[error("observation queue closed while worker {worker} was still sending")]
    ObservationQueueClosed { worker: usize },

    /// A pipeline task panicked or was aborted.
    #[error("{task} task failed: {source}")]
    TaskFailed {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl PipelineError {
    /// True for the early-termination path, which is not a real failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

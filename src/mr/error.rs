use std::path::PathBuf;

use thiserror::Error;

/// Everything that can end a worker. Any of these abandons the current task
/// attempt; the coordinator recovers the task once its timeout elapses.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The assigned input file could not be read.
    #[error("failed to read input {path}: {source}")]
    Input {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Creating, writing or renaming an artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An intermediate file holds a line that is not a record.
    #[error("malformed record in {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Some Map task's file for this bucket is absent.
    #[error("bucket {bucket} is missing intermediate files from map tasks {missing:?}")]
    MissingIntermediate { bucket: u32, missing: Vec<u32> },

    #[error("invalid intermediate file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// The coordinator could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    /// The user-supplied Map or Reduce function panicked.
    #[error("task execution aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

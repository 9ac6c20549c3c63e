//! Error types shared across the workspace.
//!
//! `TrackerError` unifies storage, configuration, and internal failures so crates can
//! propagate a single error type with `?`. `FetchError` is deliberately separate: a
//! failed fetch is an ordinary per-key outcome recorded in a cycle report, not an
//! error that unwinds a caller.
use std::io;
use std::path::PathBuf;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by the tracker crates.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// I/O error that is not attributable to a specific series or config file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A key was empty or contained characters that cannot name a series file.
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    /// A persisted series could not be read at all.
    #[error("Failed to read series {path}: {source}")]
    StorageRead {
        /// File that failed to open or read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// A sample could not be durably appended; the in-memory series was left untouched.
    #[error("Failed to append to series {path}: {source}")]
    StorageWrite {
        /// File that failed to accept the row.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// Persisted configuration was unreadable, malformed, or could not be written.
    #[error("Config error: {0}")]
    Config(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// A new cycle was requested while one was still in flight on the same coordinator.
    #[error("A refresh cycle is already in progress")]
    CycleInProgress,

    /// Crossbeam/channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),
}

impl<T> From<PoisonError<T>> for TrackerError {
    fn from(err: PoisonError<T>) -> Self {
        TrackerError::MutexLock(err.to_string())
    }
}

/// Outcome of a single failed fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The source did not answer within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The source answered with text that is not a finite number.
    #[error("cannot parse price from {0:?}")]
    Parse(String),

    /// The source itself reported a failure (or panicked).
    #[error("source failed: {0}")]
    External(String),

    /// The price was fetched but could not be persisted.
    #[error("fetched but not stored: {0}")]
    Storage(String),
}

impl FetchError {
    /// Returns `true` for [`FetchError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

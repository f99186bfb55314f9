//! Error types for parallel-dl
//!
//! Every failure in the engine is recovered locally: one task's error never
//! affects another task, and nothing here is fatal to the process. Errors
//! reach the caller both as the `Result` of the triggering call and as a
//! [`Failed`](crate::types::Event::Failed) event carrying the same message.

use crate::types::{TaskId, TaskState};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for parallel-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for parallel-dl
///
/// Each variant includes the context needed to diagnose the failure without
/// consulting logs.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent")
        key: Option<String>,
    },

    /// The destination directory or file could not be created/opened.
    ///
    /// Terminal for the admission attempt: the task moves to `Failed` and is
    /// never retried automatically; only an explicit `restart` re-queues it.
    #[error("destination unwritable: {path}: {reason}")]
    DestinationUnwritable {
        /// The path that could not be opened
        path: PathBuf,
        /// The underlying I/O failure
        reason: String,
    },

    /// The transport reported a failure for this task's transfer
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The inactivity watchdog fired: no data arrived within the task's window
    #[error("task {id} timed out: no data received within the inactivity window")]
    Timeout {
        /// The task that timed out
        id: TaskId,
    },

    /// An operation referenced a task id that does not exist
    #[error("task {id} not found")]
    UnknownId {
        /// The unknown task id
        id: TaskId,
    },

    /// The task is not in a state that permits the requested operation
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task the operation targeted
        id: TaskId,
        /// The operation that was attempted (e.g., "start", "restart")
        operation: String,
        /// The state that blocks the operation
        current_state: TaskState,
    },

    /// Shutdown in progress - the manager is no longer accepting commands
    #[error("shutdown in progress: manager is no longer accepting commands")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by a [`Transport`](crate::transport::Transport) implementation
#[derive(Debug, Error)]
pub enum TransportError {
    /// The locator cannot be handled by this transport (bad scheme, malformed URL)
    #[error("unsupported locator: {0}")]
    Unsupported(String),

    /// The request could not be issued or the connection failed
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success HTTP status
    #[error("server returned HTTP status {status}")]
    HttpStatus {
        /// The status code the server returned
        status: u16,
    },
}

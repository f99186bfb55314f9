//! Core types for parallel-dl

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Unique identifier for a download task
///
/// Ids are assigned at append time, strictly increasing for the lifetime of
/// the process, and never reused, not even after the task is erased.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl PartialEq<u64> for TaskId {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<TaskId> for u64 {
    fn eq(&self, other: &TaskId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Task state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Appended and waiting for admission
    Queued,
    /// Admitted; a transport transfer is in flight
    Active,
    /// Transfer completed successfully
    Finished,
    /// Transfer failed (transport error or unwritable destination)
    Failed,
    /// Aborted by the inactivity watchdog
    TimedOut,
}

impl TaskState {
    /// Stable lowercase name, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Active => "active",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::TimedOut => "timed_out",
        }
    }

    /// Whether the task has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::TimedOut
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a task failure, so callers can react differently to a
/// stalled transfer than to a hard error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The transport reported an error
    Transport,
    /// The inactivity watchdog aborted the transfer
    Timeout,
    /// The destination could not be created or opened
    Destination,
}

/// Where a task's bytes go
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Write into `dir` under a collision-free name resolved at admission
    File {
        /// Target directory, created if missing
        dir: PathBuf,
        /// Desired file name; derived from the URL when `None`
        file_name: Option<String>,
    },
    /// Accumulate the response in memory and hand it back on completion
    #[default]
    Memory,
}

impl Destination {
    /// File-mode destination with the name derived from the URL
    pub fn dir(dir: impl Into<PathBuf>) -> Self {
        Destination::File {
            dir: dir.into(),
            file_name: None,
        }
    }

    /// File-mode destination with an explicit desired name
    pub fn file(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Destination::File {
            dir: dir.into(),
            file_name: Some(file_name.into()),
        }
    }
}

/// What to fetch: URL, method, and headers, handed verbatim to the transport
///
/// Opaque to the engine: only the transport interprets it.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    /// Target URL
    pub url: Url,
    /// HTTP method (default GET)
    pub method: String,
    /// Extra request headers as (name, value) pairs
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    /// Build a GET request for `url`
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: Vec::new(),
        }
    }

    /// Parse `url` and build a GET request for it
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Override the HTTP method
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Add a request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl From<Url> for FetchRequest {
    fn from(url: Url) -> Self {
        Self::new(url)
    }
}

/// Options for appending a task
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppendOptions {
    /// Where the bytes go (default: in-memory buffer)
    #[serde(default)]
    pub destination: Destination,

    /// Inactivity window for the watchdog; falls back to
    /// `Config::default_timeout` when `None`
    #[serde(default)]
    pub timeout: Option<Duration>,
}

/// What a finished task produced
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The resolved path the bytes were written to
    File {
        /// Absolute or caller-relative path of the written file
        path: PathBuf,
    },
    /// The accumulated response body
    Buffer {
        /// The downloaded bytes
        bytes: Bytes,
    },
}

/// Event emitted during the task lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Bytes arrived for an active task
    Progress {
        /// Task ID
        id: TaskId,
        /// Cumulative bytes received
        received: u64,
        /// Expected total, when the transport knows it
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },

    /// Task completed successfully
    Finished {
        /// Task ID
        id: TaskId,
        /// File path or buffered bytes, depending on the destination mode
        outcome: DownloadOutcome,
    },

    /// Task failed or timed out
    Failed {
        /// Task ID
        id: TaskId,
        /// Failure classification
        kind: FailureKind,
        /// Error message
        error: String,
    },

    /// No active tasks remain and nothing admissible is queued
    AllFinished,
}

/// Read-only view of a task, for inspection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Unique task identifier
    pub id: TaskId,

    /// The request URL
    pub url: String,

    /// Current state
    pub state: TaskState,

    /// Target directory (file mode only)
    pub destination_dir: Option<PathBuf>,

    /// Collision-free name resolved at first admission (file mode only)
    pub resolved_name: Option<String>,

    /// Bytes received so far
    pub bytes_received: u64,

    /// Expected total bytes (None if unknown)
    pub bytes_total: Option<u64>,

    /// Last error message (None when none)
    pub error: Option<String>,

    /// Inactivity window for the watchdog (None disables it)
    pub timeout: Option<Duration>,

    /// When the task was appended
    pub created_at: DateTime<Utc>,

    /// When the task was last admitted (None if never started)
    pub started_at: Option<DateTime<Utc>>,
}

/// Aggregate queue statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueStats {
    /// Total number of tasks in the registry
    pub total: usize,

    /// Tasks waiting for admission
    pub queued: usize,

    /// Tasks with a transfer in flight
    pub active: usize,

    /// Tasks that completed successfully
    pub finished: usize,

    /// Tasks that failed
    pub failed: usize,

    /// Tasks aborted by the watchdog
    pub timed_out: usize,

    /// Current concurrency bound
    pub max_concurrent: usize,
}

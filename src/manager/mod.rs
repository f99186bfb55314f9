//! The download engine: the public manager handle and the driver loop
//! behind it.
//!
//! Split into focused submodules:
//! - [`driver`] - The event loop owning all mutable state
//! - [`registry`] - Task records and the dual id/handle index
//! - [`watchdog`] - Inactivity deadlines for active transfers
//! - [`admission`] - Queueing, admission control, and task operations
//! - [`transfers`] - Inbound transport events and retirement

mod admission;
mod driver;
mod registry;
mod transfers;
mod watchdog;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::transport::{HttpTransport, Transport};
use crate::types::{
    AppendOptions, Event, FetchRequest, QueueStats, TaskId, TaskSnapshot,
};
use driver::{Command, Driver};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Handle to the download engine (cloneable - all fields are shared)
///
/// All mutable state lives in a driver task spawned by the constructor;
/// this handle marshals operations into that task over a command channel,
/// so any number of clones can be used concurrently.
///
/// # Examples
///
/// ```no_run
/// use parallel_dl::{Config, DownloadManager, Event, FetchRequest};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = DownloadManager::new(Config::default())?;
///     let mut events = manager.subscribe();
///
///     let request = FetchRequest::parse("https://example.com/report.pdf")?;
///     let id = manager.append_to_dir(request, "./downloads").await?;
///     manager.start(id).await?;
///
///     while let Ok(event) = events.recv().await {
///         match event {
///             Event::Finished { id, .. } => println!("task {id} finished"),
///             Event::Failed { id, error, .. } => println!("task {id} failed: {error}"),
///             Event::AllFinished => break,
///             _ => {}
///         }
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct DownloadManager {
    /// Command channel into the driver loop
    commands: mpsc::Sender<Command>,
    /// Event broadcast sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// Cancels the driver loop on shutdown
    cancel: CancellationToken,
    /// Join handle of the driver task, taken by the first `shutdown` call
    driver: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DownloadManager {
    /// Create a manager backed by the bundled [`HttpTransport`]
    ///
    /// Spawns the driver task, so this must be called from within a Tokio
    /// runtime. Fails if the configuration does not validate.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Create a manager on top of a caller-provided transport
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(config.event_channel_capacity);
        let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity);
        let (transport_tx, transport_rx) = mpsc::channel(config.transport_channel_capacity);
        let cancel = CancellationToken::new();

        let driver = Driver::new(config, transport, event_tx.clone(), transport_tx);
        let handle = tokio::spawn(driver.run(command_rx, transport_rx, cancel.clone()));

        Ok(Self {
            commands: command_tx,
            event_tx,
            cancel,
            driver: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// Register a new download task and return its id
    ///
    /// The task starts out `Queued` and holds no resources until it is
    /// admitted via [`start`](Self::start) or a retirement scan. Appending
    /// never blocks on the concurrency bound.
    pub async fn append(&self, request: FetchRequest, options: AppendOptions) -> Result<TaskId> {
        self.command(|respond| Command::Append {
            request,
            options,
            respond,
        })
        .await
    }

    /// Append a task that writes into `dir` under a name derived from the
    /// URL (with collision-free renaming)
    pub async fn append_to_dir(
        &self,
        request: FetchRequest,
        dir: impl Into<PathBuf>,
    ) -> Result<TaskId> {
        self.append(
            request,
            AppendOptions {
                destination: crate::types::Destination::dir(dir),
                ..AppendOptions::default()
            },
        )
        .await
    }

    /// Append a task that accumulates the response in memory
    pub async fn append_buffered(&self, request: FetchRequest) -> Result<TaskId> {
        self.append(request, AppendOptions::default()).await
    }

    /// Start a queued task
    ///
    /// Admits the task immediately when a concurrency slot is free;
    /// otherwise it stays `Queued` and is admitted by a later retirement
    /// scan (that case is still `Ok`). Fails with
    /// [`Error::InvalidState`] when the task is not `Queued`, or with the
    /// admission error when the destination cannot be opened or the
    /// transport rejects the request (the task is then `Failed`).
    pub async fn start(&self, id: TaskId) -> Result<()> {
        self.command(|respond| Command::Start { id, respond }).await?
    }

    /// Restart a `Failed` or `TimedOut` task
    ///
    /// Clears the error and any partial buffer, requeues the task, and
    /// attempts admission under the same resolved destination name (the
    /// file is reopened in truncate mode).
    pub async fn restart(&self, id: TaskId) -> Result<()> {
        self.command(|respond| Command::Restart { id, respond })
            .await?
    }

    /// Remove a task in any state, aborting its transfer if active
    pub async fn erase(&self, id: TaskId) -> Result<()> {
        self.command(|respond| Command::Erase { id, respond }).await?
    }

    /// Remove all tasks, aborting active transfers; returns how many tasks
    /// were removed
    pub async fn clear(&self) -> Result<usize> {
        self.command(|respond| Command::Clear { respond }).await
    }

    /// Change the concurrency bound at runtime
    ///
    /// Never preempts active tasks; only future admissions see the new
    /// value. `limit` must be at least 1.
    pub async fn set_max_concurrent(&self, limit: usize) -> Result<()> {
        self.command(|respond| Command::SetMaxConcurrent { limit, respond })
            .await?
    }

    /// Current concurrency bound
    pub async fn max_concurrent(&self) -> Result<usize> {
        self.command(|respond| Command::MaxConcurrent { respond })
            .await
    }

    /// Number of currently active tasks
    pub async fn active_count(&self) -> Result<usize> {
        self.command(|respond| Command::ActiveCount { respond })
            .await
    }

    /// Read-only snapshot of one task, or `None` for an unknown id
    pub async fn task(&self, id: TaskId) -> Result<Option<TaskSnapshot>> {
        self.command(|respond| Command::Task { id, respond }).await
    }

    /// Snapshots of all tasks in ascending id order
    pub async fn tasks(&self) -> Result<Vec<TaskSnapshot>> {
        self.command(|respond| Command::Tasks { respond }).await
    }

    /// Aggregate queue counters
    pub async fn stats(&self) -> Result<QueueStats> {
        self.command(|respond| Command::Stats { respond }).await
    }

    /// Subscribe to lifecycle events
    ///
    /// Multiple subscribers are supported; each receives every event
    /// independently. A subscriber that falls behind by more than the
    /// configured channel capacity observes a `RecvError::Lagged` gap.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The event subscription as a [`Stream`](futures::Stream)
    pub fn event_stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.event_tx.subscribe())
    }

    /// Stop the driver loop, aborting all active transfers
    ///
    /// Idempotent. After shutdown every manager method fails with
    /// [`Error::ShuttingDown`].
    pub async fn shutdown(&self) {
        info!("download manager shutting down");
        self.cancel.cancel();
        let handle = self.driver.lock().await.take();
        if let Some(handle) = handle {
            handle.await.ok();
        }
    }

    /// Marshal one command into the driver loop and wait for its reply
    async fn command<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R> {
        let (respond, reply) = oneshot::channel();
        self.commands
            .send(build(respond))
            .await
            .map_err(|_| Error::ShuttingDown)?;
        reply.await.map_err(|_| Error::ShuttingDown)
    }
}

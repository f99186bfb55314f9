//! Queueing, admission control, and the caller-facing task operations.
//!
//! Admission is the only place a task acquires a transport handle, a
//! concurrency slot, and a watchdog timer, and `release_slot` (transfers
//! module) is the only place it gives them back, so the three stay in step.

use super::driver::Driver;
use crate::error::{Error, Result};
use crate::namer;
use crate::types::{AppendOptions, Destination, Event, FailureKind, FetchRequest, TaskId, TaskState};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl Driver {
    /// Register a new queued task. Never admits by itself; work begins on
    /// `start(id)` or when a retirement scan reaches the task.
    pub(super) fn append(&mut self, request: FetchRequest, options: AppendOptions) -> TaskId {
        let timeout = options.timeout.or(self.config.default_timeout);
        let id = self.registry.append(request, options.destination, timeout);
        debug!(id = %id, "task appended");
        id
    }

    /// Admit a specific queued task, or leave it queued when the bound is
    /// reached. Admission failure marks the task `Failed` and surfaces the
    /// error to the caller.
    pub(super) async fn start(&mut self, id: TaskId) -> Result<()> {
        let state = self.registry.get(id).ok_or(Error::UnknownId { id })?.state;
        if state != TaskState::Queued {
            return Err(Error::InvalidState {
                id,
                operation: "start".to_string(),
                current_state: state,
            });
        }
        if self.active >= self.max_concurrent {
            debug!(
                id = %id,
                active = self.active,
                max_concurrent = self.max_concurrent,
                "concurrency bound reached, task stays queued"
            );
            return Ok(());
        }
        self.admit(id).await
    }

    /// Requeue a failed or timed-out task and attempt admission again under
    /// the same resolved name.
    pub(super) async fn restart(&mut self, id: TaskId) -> Result<()> {
        let state = self.registry.get(id).ok_or(Error::UnknownId { id })?.state;
        if !matches!(state, TaskState::Failed | TaskState::TimedOut) {
            return Err(Error::InvalidState {
                id,
                operation: "restart".to_string(),
                current_state: state,
            });
        }
        if let Some(handle) = self.release_slot(id) {
            self.transport.abort(handle).await;
        }
        if let Some(record) = self.registry.get_mut(id) {
            record.state = TaskState::Queued;
            record.error = None;
            record.buffer.clear();
            record.bytes_received = 0;
            record.bytes_total = None;
            record.started_at = None;
        }
        debug!(id = %id, "task requeued for restart");
        if self.active >= self.max_concurrent {
            return Ok(());
        }
        self.admit(id).await
    }

    /// Remove a task in any state. Erasing an active task aborts its
    /// transfer, frees its slot, and runs the same admission scan as a
    /// retirement; no terminal event is emitted for the erased task.
    pub(super) async fn erase(&mut self, id: TaskId) -> Result<()> {
        let was_active = self.registry.get(id).ok_or(Error::UnknownId { id })?.state
            == TaskState::Active;
        if let Some(handle) = self.release_slot(id) {
            self.transport.abort(handle).await;
        }
        self.registry.remove(id);
        debug!(id = %id, was_active, "task erased");
        if was_active {
            self.start_next().await;
        }
        Ok(())
    }

    /// Erase everything, aborting active transfers. Deliberately silent: the
    /// caller emptied the system, so no `AllFinished` follows.
    pub(super) async fn clear(&mut self) -> usize {
        self.watchdog.clear();
        let records = self.registry.drain();
        for record in &records {
            if let Some(handle) = record.handle {
                self.transport.abort(handle).await;
            }
        }
        self.active = 0;
        info!(count = records.len(), "all tasks cleared");
        records.len()
    }

    /// Change the concurrency bound. Never preempts active tasks; only
    /// future admission decisions see the new value.
    pub(super) fn set_max_concurrent(&mut self, limit: usize) -> Result<()> {
        if limit == 0 {
            return Err(Error::Config {
                message: "max_concurrent must be at least 1".to_string(),
                key: Some("max_concurrent".to_string()),
            });
        }
        info!(previous = self.max_concurrent, limit, "concurrency bound changed");
        self.max_concurrent = limit;
        Ok(())
    }

    /// Admission scan, run once per retirement: admit the first queued task
    /// (ascending id) whose launch succeeds; tasks that fail to launch are
    /// marked `Failed` and the scan moves on. Announces `AllFinished` when
    /// nothing is active and nothing admissible remains.
    pub(super) async fn start_next(&mut self) {
        if self.active < self.max_concurrent {
            while let Some(id) = self.next_queued() {
                if self.admit(id).await.is_ok() {
                    break;
                }
            }
        }
        if self.active == 0 && self.next_queued().is_none() {
            debug!("no active or queued work remains");
            self.emit(Event::AllFinished);
        }
    }

    fn next_queued(&self) -> Option<TaskId> {
        self.registry
            .iter()
            .find(|record| record.state == TaskState::Queued)
            .map(|record| record.id)
    }

    /// Launch a queued task, downgrading it to `Failed` (with an event) when
    /// the launch does not go through.
    pub(super) async fn admit(&mut self, id: TaskId) -> Result<()> {
        if let Err(error) = self.launch(id).await {
            let kind = match &error {
                Error::DestinationUnwritable { .. } => FailureKind::Destination,
                _ => FailureKind::Transport,
            };
            warn!(id = %id, error = %error, "admission failed");
            self.fail_task(id, kind, error.to_string());
            return Err(error);
        }
        Ok(())
    }

    /// The admission sequence: resolve and open the destination, issue the
    /// transport request, then take the slot and arm the watchdog.
    async fn launch(&mut self, id: TaskId) -> Result<()> {
        self.prepare_destination(id).await?;
        let (request, timeout) = {
            let record = self.registry.get(id).ok_or(Error::UnknownId { id })?;
            (record.request.clone(), record.timeout)
        };
        let handle = self
            .transport
            .issue(&request, self.transport_tx.clone())
            .await?;
        if let Some(record) = self.registry.get_mut(id) {
            record.state = TaskState::Active;
            record.bytes_received = 0;
            record.bytes_total = None;
            record.started_at = Some(Utc::now());
        }
        self.registry.bind_handle(id, handle);
        self.active += 1;
        if let Some(window) = timeout {
            self.watchdog.arm(id, Instant::now() + window);
        }
        info!(id = %id, handle = %handle, url = %request.url, "download admitted");
        Ok(())
    }

    /// File mode: resolve the collision-free name once, create the target
    /// directory, and open the file in truncate mode. Memory mode: start the
    /// attempt from an empty buffer.
    async fn prepare_destination(&mut self, id: TaskId) -> Result<()> {
        let (destination, url, already_resolved) = {
            let record = self.registry.get(id).ok_or(Error::UnknownId { id })?;
            (
                record.destination.clone(),
                record.request.url.clone(),
                record.resolved_name.clone(),
            )
        };
        let Destination::File { dir, file_name } = destination else {
            if let Some(record) = self.registry.get_mut(id) {
                record.buffer.clear();
            }
            return Ok(());
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|error| Error::DestinationUnwritable {
                path: dir.clone(),
                reason: error.to_string(),
            })?;
        let resolved = match already_resolved {
            Some(name) => name,
            None => {
                let desired = match file_name {
                    Some(name) => name,
                    None => namer::derive_from_url(&url, &self.config.fallback_file_name),
                };
                let resolved = namer::resolve(
                    &dir,
                    &desired,
                    &self.config.default_extension,
                    &self.config.fallback_file_name,
                );
                debug!(id = %id, desired = %desired, resolved = %resolved, "destination name resolved");
                resolved
            }
        };
        let path = dir.join(&resolved);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|error| Error::DestinationUnwritable {
                path: path.clone(),
                reason: error.to_string(),
            })?;
        if let Some(record) = self.registry.get_mut(id) {
            record.resolved_name = Some(resolved);
            record.file = Some(file);
        }
        Ok(())
    }

    /// Shutdown path: abort every live transfer and drop all timers. Task
    /// records are left as they are; the loop is about to exit.
    pub(super) async fn abort_all(&mut self) {
        self.watchdog.clear();
        let active_ids: Vec<TaskId> = self
            .registry
            .iter()
            .filter(|record| record.state == TaskState::Active)
            .map(|record| record.id)
            .collect();
        for id in active_ids {
            if let Some(handle) = self.registry.unbind_handle(id) {
                self.transport.abort(handle).await;
            }
        }
        self.active = 0;
        debug!("all active transfers aborted");
    }
}

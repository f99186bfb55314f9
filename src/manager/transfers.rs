//! Inbound transport events, watchdog expiry, and task retirement.
//!
//! Events are routed by transport handle through the registry's side index.
//! A handle with no index entry belongs to a task that already retired or
//! was erased, so its late events are dropped here without touching state.

use super::driver::Driver;
use crate::error::Error;
use crate::transport::{TransferHandle, TransportEvent};
use crate::types::{DownloadOutcome, Event, FailureKind, TaskId, TaskState};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{info, trace, warn};

impl Driver {
    pub(super) async fn handle_transport_event(&mut self, event: TransportEvent) {
        let handle = event.handle();
        let Some(id) = self.registry.task_for_handle(handle) else {
            trace!(handle = %handle, "transport event for an unindexed handle dropped");
            return;
        };
        match event {
            TransportEvent::Data { chunk, .. } => self.handle_data(id, chunk).await,
            TransportEvent::Progress {
                received, total, ..
            } => self.handle_progress(id, received, total),
            TransportEvent::Done { .. } => self.handle_done(id).await,
            TransportEvent::Error { message, .. } => {
                self.handle_transport_failure(id, message).await;
            }
        }
    }

    /// Append the chunk to the task's file or buffer. A write failure retires
    /// the task the same way a transport error would, with a destination kind.
    async fn handle_data(&mut self, id: TaskId, chunk: Bytes) {
        self.reset_watchdog(id);
        let write_error = {
            let Some(record) = self.registry.get_mut(id) else {
                return;
            };
            record.bytes_received += chunk.len() as u64;
            match record.file.as_mut() {
                Some(file) => file.write_all(&chunk).await.err(),
                None => {
                    record.buffer.extend_from_slice(&chunk);
                    None
                }
            }
        };
        if let Some(error) = write_error {
            warn!(id = %id, error = %error, "destination write failed, aborting transfer");
            if let Some(handle) = self.release_slot(id) {
                self.transport.abort(handle).await;
            }
            self.fail_task(id, FailureKind::Destination, format!("write failed: {error}"));
            self.start_next().await;
        }
    }

    fn handle_progress(&mut self, id: TaskId, received: u64, total: Option<u64>) {
        self.reset_watchdog(id);
        let Some(record) = self.registry.get_mut(id) else {
            return;
        };
        // Data events already count delivered bytes; take whichever is ahead
        if received > record.bytes_received {
            record.bytes_received = received;
        }
        if total.is_some() {
            record.bytes_total = total;
        }
        let event = Event::Progress {
            id,
            received: record.bytes_received,
            total: record.bytes_total,
        };
        self.emit(event);
    }

    async fn handle_done(&mut self, id: TaskId) {
        self.release_slot(id);
        if let Some(error) = self.finalize_file(id).await {
            warn!(id = %id, error = %error, "failed to flush destination file");
            self.fail_task(
                id,
                FailureKind::Destination,
                format!("failed to flush destination file: {error}"),
            );
            self.start_next().await;
            return;
        }
        let outcome = {
            let Some(record) = self.registry.get_mut(id) else {
                return;
            };
            record.state = TaskState::Finished;
            match record.resolved_path() {
                Some(path) => DownloadOutcome::File { path },
                None => DownloadOutcome::Buffer {
                    bytes: record.buffer.split().freeze(),
                },
            }
        };
        info!(id = %id, "download finished");
        self.emit(Event::Finished { id, outcome });
        self.start_next().await;
    }

    /// Transport-side failure: retire the task as `Failed`, leaving partial
    /// output (file on disk, buffered bytes) in place for inspection.
    async fn handle_transport_failure(&mut self, id: TaskId, message: String) {
        self.release_slot(id);
        warn!(id = %id, error = %message, "transport reported a failure");
        self.fail_task(id, FailureKind::Transport, message);
        self.start_next().await;
    }

    pub(super) async fn handle_expired_watchdogs(&mut self) {
        for id in self.watchdog.take_expired(Instant::now()) {
            self.handle_timeout(id).await;
        }
    }

    async fn handle_timeout(&mut self, id: TaskId) {
        let Some(handle) = self.release_slot(id) else {
            return;
        };
        self.transport.abort(handle).await;
        warn!(id = %id, "inactivity timeout, transfer aborted");
        let message = Error::Timeout { id }.to_string();
        self.fail_task(id, FailureKind::Timeout, message);
        self.start_next().await;
    }

    /// Push the task's inactivity deadline a full window into the future
    fn reset_watchdog(&mut self, id: TaskId) {
        let Some(window) = self.registry.get(id).and_then(|record| record.timeout) else {
            return;
        };
        self.watchdog.arm(id, Instant::now() + window);
    }

    /// Give back everything an active task holds: its timer, its
    /// handle-index entry, and its concurrency slot. Safe to call for tasks
    /// that hold nothing.
    pub(super) fn release_slot(&mut self, id: TaskId) -> Option<TransferHandle> {
        self.watchdog.disarm(id);
        let handle = self.registry.unbind_handle(id);
        if handle.is_some() {
            self.active = self.active.saturating_sub(1);
        }
        handle
    }

    /// Record a failure and emit its event. `Timeout` lands the task in
    /// `TimedOut`, every other kind in `Failed`.
    pub(super) fn fail_task(&mut self, id: TaskId, kind: FailureKind, message: String) {
        if let Some(record) = self.registry.get_mut(id) {
            record.state = if kind == FailureKind::Timeout {
                TaskState::TimedOut
            } else {
                TaskState::Failed
            };
            record.error = Some(message.clone());
            record.file = None;
        }
        self.emit(Event::Failed {
            id,
            kind,
            error: message,
        });
    }

    /// Flush and close the destination file, if one is open
    async fn finalize_file(&mut self, id: TaskId) -> Option<std::io::Error> {
        let file = self
            .registry
            .get_mut(id)
            .and_then(|record| record.file.take());
        match file {
            Some(mut file) => file.flush().await.err(),
            None => None,
        }
    }
}

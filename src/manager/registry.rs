//! Task records and the dual id/handle index.
//!
//! The registry is owned exclusively by the driver loop, so both indices
//! always change together and callers never observe a half-updated pair.

use crate::transport::TransferHandle;
use crate::types::{Destination, FetchRequest, QueueStats, TaskId, TaskSnapshot, TaskState};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;

/// Everything the engine knows about one task
pub(crate) struct TaskRecord {
    pub(crate) id: TaskId,
    pub(crate) request: FetchRequest,
    pub(crate) destination: Destination,
    /// Inactivity window for the watchdog; `None` disables it
    pub(crate) timeout: Option<Duration>,
    pub(crate) state: TaskState,
    /// Collision-free file name, computed once at first admission and
    /// reused verbatim on restart
    pub(crate) resolved_name: Option<String>,
    /// Open destination file while the task is active in file mode
    pub(crate) file: Option<File>,
    /// Accumulated body in memory mode
    pub(crate) buffer: BytesMut,
    /// Live transport handle, present only while `Active`
    pub(crate) handle: Option<TransferHandle>,
    pub(crate) bytes_received: u64,
    pub(crate) bytes_total: Option<u64>,
    pub(crate) error: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    fn new(
        id: TaskId,
        request: FetchRequest,
        destination: Destination,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            request,
            destination,
            timeout,
            state: TaskState::Queued,
            resolved_name: None,
            file: None,
            buffer: BytesMut::new(),
            handle: None,
            bytes_received: 0,
            bytes_total: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
        }
    }

    /// Full path of the destination file, once the name is resolved
    pub(crate) fn resolved_path(&self) -> Option<PathBuf> {
        match (&self.destination, &self.resolved_name) {
            (Destination::File { dir, .. }, Some(name)) => Some(dir.join(name)),
            _ => None,
        }
    }

    /// Read-only view handed out through the inspection API
    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            url: self.request.url.to_string(),
            state: self.state,
            destination_dir: match &self.destination {
                Destination::File { dir, .. } => Some(dir.clone()),
                Destination::Memory => None,
            },
            resolved_name: self.resolved_name.clone(),
            bytes_received: self.bytes_received,
            bytes_total: self.bytes_total,
            error: self.error.clone(),
            timeout: self.timeout,
            created_at: self.created_at,
            started_at: self.started_at,
        }
    }
}

/// Owned task table keyed by id, with a side index from live transport
/// handles back to ids.
///
/// Ids are handed out from a counter that only moves forward, so an id is
/// never reused even after its task is erased. The `BTreeMap` keeps
/// ascending-id iteration free for the scheduler's scan.
pub(crate) struct Registry {
    tasks: BTreeMap<TaskId, TaskRecord>,
    by_handle: HashMap<TransferHandle, TaskId>,
    next_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            by_handle: HashMap::new(),
            next_id: 0,
        }
    }

    /// Create a new queued record and return its fresh id
    pub(crate) fn append(
        &mut self,
        request: FetchRequest,
        destination: Destination,
        timeout: Option<Duration>,
    ) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        self.tasks
            .insert(id, TaskRecord::new(id, request, destination, timeout));
        id
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(&id)
    }

    /// Remove a record, dropping its handle-index entry with it
    pub(crate) fn remove(&mut self, id: TaskId) -> Option<TaskRecord> {
        let record = self.tasks.remove(&id)?;
        if let Some(handle) = record.handle {
            self.by_handle.remove(&handle);
        }
        Some(record)
    }

    /// Empty both indices, returning the removed records
    pub(crate) fn drain(&mut self) -> Vec<TaskRecord> {
        self.by_handle.clear();
        std::mem::take(&mut self.tasks).into_values().collect()
    }

    /// Point the side index at `id` and store the handle on the record
    pub(crate) fn bind_handle(&mut self, id: TaskId, handle: TransferHandle) {
        if let Some(record) = self.tasks.get_mut(&id) {
            record.handle = Some(handle);
            self.by_handle.insert(handle, id);
        }
    }

    /// Drop the record's handle and its side-index entry, returning the
    /// handle if one was bound
    pub(crate) fn unbind_handle(&mut self, id: TaskId) -> Option<TransferHandle> {
        let handle = self.tasks.get_mut(&id).and_then(|record| record.handle.take())?;
        self.by_handle.remove(&handle);
        Some(handle)
    }

    pub(crate) fn task_for_handle(&self, handle: TransferHandle) -> Option<TaskId> {
        self.by_handle.get(&handle).copied()
    }

    /// Records in ascending id order
    pub(crate) fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    pub(crate) fn stats(&self, max_concurrent: usize) -> QueueStats {
        let mut stats = QueueStats {
            total: self.tasks.len(),
            queued: 0,
            active: 0,
            finished: 0,
            failed: 0,
            timed_out: 0,
            max_concurrent,
        };
        for record in self.tasks.values() {
            match record.state {
                TaskState::Queued => stats.queued += 1,
                TaskState::Active => stats.active += 1,
                TaskState::Finished => stats.finished += 1,
                TaskState::Failed => stats.failed += 1,
                TaskState::TimedOut => stats.timed_out += 1,
            }
        }
        stats
    }
}

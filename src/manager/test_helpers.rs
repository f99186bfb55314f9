//! Shared test helpers: a scripted in-process transport and event waiters.

use crate::config::Config;
use crate::error::TransportError;
use crate::manager::DownloadManager;
use crate::transport::{TransferHandle, Transport, TransportEvent};
use crate::types::{Event, FetchRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc};

/// Transport scripted from the test body.
///
/// `issue` hands out a fresh handle and records the event sender for it;
/// the test then injects data, progress, and terminal events through the
/// `send_*` methods and inspects which handles were issued or aborted.
pub(crate) struct MockTransport {
    next_handle: AtomicU64,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    senders: HashMap<TransferHandle, mpsc::Sender<TransportEvent>>,
    issued: Vec<TransferHandle>,
    aborted: Vec<TransferHandle>,
    refuse_next: Option<String>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicU64::new(0),
            state: Mutex::new(MockState::default()),
        })
    }

    /// Make the next `issue` call fail with `Unsupported(message)`
    pub(crate) async fn refuse_next_issue(&self, message: &str) {
        self.state.lock().await.refuse_next = Some(message.to_string());
    }

    pub(crate) async fn issued(&self) -> Vec<TransferHandle> {
        self.state.lock().await.issued.clone()
    }

    pub(crate) async fn aborted(&self) -> Vec<TransferHandle> {
        self.state.lock().await.aborted.clone()
    }

    /// Handle minted by the most recent `issue`
    pub(crate) async fn last_handle(&self) -> TransferHandle {
        *self
            .state
            .lock()
            .await
            .issued
            .last()
            .expect("no transfer was issued")
    }

    pub(crate) async fn send_data(&self, handle: TransferHandle, bytes: &[u8]) {
        self.send(
            handle,
            TransportEvent::Data {
                handle,
                chunk: bytes::Bytes::copy_from_slice(bytes),
            },
        )
        .await;
    }

    pub(crate) async fn send_progress(
        &self,
        handle: TransferHandle,
        received: u64,
        total: Option<u64>,
    ) {
        self.send(
            handle,
            TransportEvent::Progress {
                handle,
                received,
                total,
            },
        )
        .await;
    }

    pub(crate) async fn send_done(&self, handle: TransferHandle) {
        self.send(handle, TransportEvent::Done { handle }).await;
    }

    pub(crate) async fn send_error(&self, handle: TransferHandle, message: &str) {
        self.send(
            handle,
            TransportEvent::Error {
                handle,
                message: message.to_string(),
            },
        )
        .await;
    }

    async fn send(&self, handle: TransferHandle, event: TransportEvent) {
        let sender = self
            .state
            .lock()
            .await
            .senders
            .get(&handle)
            .cloned()
            .expect("transfer was never issued");
        sender.send(event).await.expect("driver loop is gone");
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn issue(
        &self,
        _request: &FetchRequest,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<TransferHandle, TransportError> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.refuse_next.take() {
            return Err(TransportError::Unsupported(message));
        }
        let handle = TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        state.senders.insert(handle, events);
        state.issued.push(handle);
        Ok(handle)
    }

    async fn abort(&self, handle: TransferHandle) {
        self.state.lock().await.aborted.push(handle);
    }
}

/// A manager wired to a fresh mock transport
pub(crate) fn manager_with_mock(config: Config) -> (DownloadManager, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let manager = DownloadManager::with_transport(config, transport.clone())
        .expect("test configuration is valid");
    (manager, transport)
}

pub(crate) fn config_with_bound(max_concurrent: usize) -> Config {
    Config {
        max_concurrent,
        ..Config::default()
    }
}

pub(crate) fn request(path: &str) -> FetchRequest {
    FetchRequest::parse(&format!("http://files.test/{path}")).expect("static test URL parses")
}

/// Wait up to five seconds for an event accepted by `matches`, discarding
/// everything before it
pub(crate) async fn wait_for_event(
    events: &mut broadcast::Receiver<Event>,
    matches: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for an event")
}

/// Collect every event up to and including the first `AllFinished`
pub(crate) async fn collect_until_all_finished(
    events: &mut broadcast::Receiver<Event>,
) -> Vec<Event> {
    let mut collected = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            let stop = matches!(event, Event::AllFinished);
            collected.push(event);
            if stop {
                break;
            }
        }
    })
    .await
    .expect("timed out waiting for all_finished");
    collected
}

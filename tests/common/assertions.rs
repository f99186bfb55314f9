//! Custom assertions and event-waiting helpers for integration tests
//!
//! The helpers take the caller's event receiver rather than subscribing on
//! their own: local transfers finish in milliseconds, so the subscription
//! must exist before the task starts or the terminal event can slip past.

use parallel_dl::{DownloadOutcome, Event, TaskId};
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for a task to reach a terminal event
#[derive(Debug)]
pub enum WaitResult {
    /// The task finished and produced this outcome
    Finished(DownloadOutcome),
    /// The task failed with this error message
    Failed(String),
    /// Timeout waiting for a terminal event
    Timeout,
    /// Event channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a specific task to reach a terminal event (`Finished` or `Failed`)
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<Event>,
    id: TaskId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Finished { id: event_id, outcome }) if event_id == id => {
                    return WaitResult::Finished(outcome);
                }
                Ok(Event::Failed { id: event_id, error, .. }) if event_id == id => {
                    return WaitResult::Failed(error);
                }
                Ok(_) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait until `AllFinished` fires, collecting every event seen on the way
/// (the `AllFinished` itself included)
pub async fn collect_until_idle(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> Vec<Event> {
    let mut seen = Vec::new();

    let outcome = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = matches!(event, Event::AllFinished);
                    seen.push(event);
                    if done {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
    .await;
    assert!(
        outcome.is_ok(),
        "no AllFinished within {timeout:?}, saw {seen:?}"
    );

    seen
}

/// Unpack a `Finished` wait into its buffer, panicking on anything else
pub fn expect_buffer(result: WaitResult) -> bytes::Bytes {
    match result {
        WaitResult::Finished(DownloadOutcome::Buffer { bytes }) => bytes,
        other => panic!("expected a buffered outcome, got {other:?}"),
    }
}

/// Unpack a `Finished` wait into its file path, panicking on anything else
pub fn expect_file(result: WaitResult) -> std::path::PathBuf {
    match result {
        WaitResult::Finished(DownloadOutcome::File { path }) => path,
        other => panic!("expected a file outcome, got {other:?}"),
    }
}

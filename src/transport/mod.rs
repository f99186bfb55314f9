//! Transport abstraction
//!
//! The engine is transport-agnostic: at admission it asks a [`Transport`] to
//! begin one transfer and then consumes that transfer's events off a channel,
//! keyed by an opaque [`TransferHandle`]. [`HttpTransport`] is the
//! batteries-included implementation; anything that can stream bytes and
//! honor an abort can stand in for it (tests use a scripted in-process
//! transport).

use crate::error::TransportError;
use crate::types::FetchRequest;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Streaming HTTP implementation
pub mod http;

pub use http::HttpTransport;

/// Opaque identifier for one in-flight transfer
///
/// Assigned by the transport at `issue` time, unique per transport instance.
/// Retired handles are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransferHandle(pub u64);

impl std::fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events a transport delivers while driving a transfer
///
/// Per handle the sequence is `Data`/`Progress` zero or more times, then
/// exactly one of `Done` or `Error`. After an abort no further events are
/// required; the consumer has already stopped routing that handle.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// A chunk of response body arrived
    Data {
        /// The transfer the chunk belongs to
        handle: TransferHandle,
        /// The received bytes
        chunk: Bytes,
    },
    /// Cumulative progress for a transfer
    Progress {
        /// The transfer being reported on
        handle: TransferHandle,
        /// Bytes received so far
        received: u64,
        /// Expected total, when known
        total: Option<u64>,
    },
    /// The transfer completed successfully (terminal)
    Done {
        /// The completed transfer
        handle: TransferHandle,
    },
    /// The transfer failed (terminal)
    Error {
        /// The failed transfer
        handle: TransferHandle,
        /// Human-readable failure description
        message: String,
    },
}

impl TransportEvent {
    /// The handle this event is tagged with
    pub fn handle(&self) -> TransferHandle {
        match self {
            TransportEvent::Data { handle, .. }
            | TransportEvent::Progress { handle, .. }
            | TransportEvent::Done { handle }
            | TransportEvent::Error { handle, .. } => *handle,
        }
    }
}

/// Capability that performs the actual network fetch
///
/// Implementations must not block the caller: `issue` validates the request,
/// registers the transfer, and returns; the transfer itself runs on the
/// transport's own tasks and reports through the `events` channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin one transfer for `request`
    ///
    /// Events tagged with the returned handle flow into `events`. Fails
    /// immediately when the locator cannot be handled (unsupported scheme,
    /// invalid method); no events are emitted in that case.
    async fn issue(
        &self,
        request: &FetchRequest,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<TransferHandle, TransportError>;

    /// Stop a transfer
    ///
    /// Idempotent and safe to call after completion or for a handle this
    /// transport never issued.
    async fn abort(&self, handle: TransferHandle);
}

//! Streaming HTTP implementation of [`Transport`]

use super::{Transport, TransferHandle, TransportEvent};
use crate::error::TransportError;
use crate::types::FetchRequest;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// HTTP transport backed by a shared [`reqwest::Client`]
///
/// Each issued transfer runs on its own tokio task, streaming the response
/// body chunk by chunk into the consumer's channel. Abort cancels the
/// transfer's token; an aborted transfer emits no terminal event.
pub struct HttpTransport {
    client: Client,
    next_handle: AtomicU64,
    inflight: Arc<Mutex<HashMap<TransferHandle, CancellationToken>>>,
}

impl HttpTransport {
    /// Create a transport with a default client
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a transport reusing an existing client (custom timeouts,
    /// proxies, user agents)
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            next_handle: AtomicU64::new(0),
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn issue(
        &self,
        request: &FetchRequest,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<TransferHandle, TransportError> {
        match request.url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(TransportError::Unsupported(format!(
                    "scheme {other:?} is not handled by HttpTransport"
                )));
            }
        }
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            TransportError::Unsupported(format!("invalid HTTP method {:?}", request.method))
        })?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let handle = TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        self.inflight.lock().await.insert(handle, cancel.clone());
        debug!(handle = %handle, url = %request.url, "issuing HTTP transfer");

        tokio::spawn(run_transfer(
            builder,
            handle,
            events,
            cancel,
            Arc::clone(&self.inflight),
        ));
        Ok(handle)
    }

    async fn abort(&self, handle: TransferHandle) {
        if let Some(token) = self.inflight.lock().await.remove(&handle) {
            debug!(handle = %handle, "aborting HTTP transfer");
            token.cancel();
        } else {
            trace!(handle = %handle, "abort for unknown or completed transfer ignored");
        }
    }
}

/// Drive one transfer to its end, then deregister it and emit the terminal
/// event (unless it was aborted or the consumer went away).
async fn run_transfer(
    builder: reqwest::RequestBuilder,
    handle: TransferHandle,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
    inflight: Arc<Mutex<HashMap<TransferHandle, CancellationToken>>>,
) {
    let result = drive_transfer(builder, handle, &events, &cancel).await;
    inflight.lock().await.remove(&handle);

    match result {
        Ok(Outcome::Completed) => {
            events.send(TransportEvent::Done { handle }).await.ok();
        }
        Ok(Outcome::Cancelled) => {
            trace!(handle = %handle, "transfer cancelled, no terminal event");
        }
        Err(error) => {
            events
                .send(TransportEvent::Error {
                    handle,
                    message: error.to_string(),
                })
                .await
                .ok();
        }
    }
}

enum Outcome {
    Completed,
    Cancelled,
}

async fn drive_transfer(
    builder: reqwest::RequestBuilder,
    handle: TransferHandle,
    events: &mpsc::Sender<TransportEvent>,
    cancel: &CancellationToken,
) -> Result<Outcome, TransportError> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Ok(Outcome::Cancelled),
        response = builder.send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::HttpStatus {
            status: status.as_u16(),
        });
    }

    let total = response.content_length();
    let mut received: u64 = 0;
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(Outcome::Cancelled),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                received += chunk.len() as u64;
                if events
                    .send(TransportEvent::Data { handle, chunk })
                    .await
                    .is_err()
                {
                    // Consumer dropped its receiver; nobody is listening anymore
                    return Ok(Outcome::Cancelled);
                }
                if events
                    .send(TransportEvent::Progress {
                        handle,
                        received,
                        total,
                    })
                    .await
                    .is_err()
                {
                    return Ok(Outcome::Cancelled);
                }
            }
            Some(Err(error)) => return Err(error.into()),
            None => return Ok(Outcome::Completed),
        }
    }
}

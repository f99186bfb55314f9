//! # parallel-dl
//!
//! Bounded-concurrency download manager library.
//!
//! ## Design Philosophy
//!
//! parallel-dl is designed to be:
//! - **Bounded** - At most `max_concurrent` transfers run at once; the rest wait their turn
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Transport-agnostic** - The engine drives any [`transport::Transport`]; an
//!   HTTP implementation ships in the box
//!
//! ## Quick Start
//!
//! ```no_run
//! use parallel_dl::{Config, DownloadManager, FetchRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         max_concurrent: 3,
//!         ..Default::default()
//!     };
//!     let manager = DownloadManager::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let request = FetchRequest::parse("https://example.com/files/report.pdf")?;
//!     let id = manager.append_to_dir(request, "downloads").await?;
//!     manager.start(id).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// One-shot archive helpers
pub mod compress;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Core download manager implementation (decomposed into focused submodules)
pub mod manager;
/// Destination name resolution
pub mod namer;
/// Transport abstraction and the bundled HTTP implementation
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result, TransportError};
pub use manager::DownloadManager;
pub use transport::{HttpTransport, TransferHandle, Transport, TransportEvent};
pub use types::{
    AppendOptions, Destination, DownloadOutcome, Event, FailureKind, FetchRequest, QueueStats,
    TaskId, TaskSnapshot, TaskState,
};

/// Helper function to run the manager with graceful signal handling.
///
/// Waits for a termination signal and then calls the manager's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use parallel_dl::{Config, DownloadManager, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = DownloadManager::new(Config::default())?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(manager).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: DownloadManager) {
    wait_for_signal().await;
    manager.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

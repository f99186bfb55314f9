//! Buffered download example
//!
//! This example demonstrates memory-mode downloads:
//! - Appending a task whose bytes accumulate in memory
//! - Consuming events as a `Stream` instead of a raw broadcast receiver
//! - Inspecting task snapshots and queue statistics
//!
//! Run with:
//! ```bash
//! cargo run --example buffered_download
//! ```

use futures::StreamExt;
use parallel_dl::{Config, DownloadManager, DownloadOutcome, Event, FetchRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let manager = DownloadManager::new(Config::default())?;

    // The stream wrapper suits combinator-style consumers
    let mut events = manager.event_stream();

    let request = FetchRequest::parse("https://example.com/api/export.json")?;
    let id = manager.append_buffered(request).await?;
    manager.start(id).await?;

    // Snapshots are available at any point in the task's life
    if let Some(snapshot) = manager.task(id).await? {
        println!(
            "Task #{} is {} ({})",
            snapshot.id, snapshot.state, snapshot.url
        );
    }

    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Finished { id: done, outcome }) if done == id => {
                if let DownloadOutcome::Buffer { bytes } = outcome {
                    println!("Received {} bytes", bytes.len());
                    let preview: String = String::from_utf8_lossy(&bytes)
                        .chars()
                        .take(120)
                        .collect();
                    println!("Preview: {}", preview);
                }
                break;
            }
            Ok(Event::Failed { id: failed, error, .. }) if failed == id => {
                eprintln!("Download failed: {}", error);
                break;
            }
            Ok(_) => {}
            // Lagged: this subscriber fell behind and missed events
            Err(e) => eprintln!("Event stream hiccup: {}", e),
        }
    }

    let stats = manager.stats().await?;
    println!(
        "Queue: {} total, {} finished, {} failed",
        stats.total, stats.finished, stats.failed
    );

    manager.shutdown().await;
    Ok(())
}

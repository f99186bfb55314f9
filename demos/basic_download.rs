//! Basic download example
//!
//! This example demonstrates the core functionality of parallel-dl:
//! - Building a configuration
//! - Creating a manager instance
//! - Subscribing to events
//! - Appending downloads to the queue
//! - Waiting until every download settles
//!
//! Run with:
//! ```bash
//! cargo run --example basic_download
//! ```

use parallel_dl::{Config, DownloadManager, DownloadOutcome, Event, FetchRequest};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    // Build configuration
    let config = Config {
        max_concurrent: 3,
        default_timeout: Some(Duration::from_secs(60)),
        ..Default::default()
    };

    // Create manager instance
    let manager = DownloadManager::new(config)?;

    // Subscribe to events
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Progress { id, received, total } => match total {
                    Some(total) if total > 0 => {
                        println!(
                            "⬇ Download #{}: {:.1}% ({} / {} bytes)",
                            id,
                            received as f64 / total as f64 * 100.0,
                            received,
                            total
                        );
                    }
                    _ => println!("⬇ Download #{}: {} bytes", id, received),
                },
                Event::Finished { id, outcome } => match outcome {
                    DownloadOutcome::File { path } => {
                        println!("✓ Download #{} complete: {}", id, path.display());
                    }
                    DownloadOutcome::Buffer { bytes } => {
                        println!("✓ Download #{} complete: {} bytes in memory", id, bytes.len());
                    }
                },
                Event::Failed { id, kind, error } => {
                    println!("✗ Download #{} failed ({:?}): {}", id, kind, error);
                }
                Event::AllFinished => {
                    println!("Queue drained, all downloads settled.");
                }
            }
        }
    });

    // Append a few downloads and start them
    let urls = [
        "https://example.com/files/report.pdf",
        "https://example.com/files/archive.tar.gz",
        "https://example.com/files/image.png",
    ];
    let mut done = manager.subscribe();
    for url in urls {
        let request = FetchRequest::parse(url)?;
        let id = manager.append_to_dir(request, "downloads").await?;
        manager.start(id).await?;
        println!("Added download with ID: {}", id);
    }

    // Wait until nothing is active or queued anymore
    while let Ok(event) = done.recv().await {
        if matches!(event, Event::AllFinished) {
            break;
        }
    }

    manager.shutdown().await;
    Ok(())
}

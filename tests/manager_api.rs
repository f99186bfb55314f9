//! Surface-level tests of the `DownloadManager` API: append, inspect, erase,
//! reconfigure, and shut down. No task is ever started, so no network or
//! transport activity happens here.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --test manager_api
//! ```

mod common;

use parallel_dl::{
    AppendOptions, Config, Destination, DownloadManager, Error, FetchRequest, TaskId, TaskState,
};
use std::time::Duration;
use tempfile::TempDir;

fn request(name: &str) -> FetchRequest {
    FetchRequest::parse(&format!("http://files.test/{name}")).expect("valid test url")
}

#[tokio::test]
async fn test_appended_tasks_are_inspectable() {
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::new(Config::default()).unwrap();

    let a = manager.append_buffered(request("a.bin")).await.unwrap();
    let b = manager
        .append_to_dir(request("b.bin"), dir.path())
        .await
        .unwrap();
    let c = manager
        .append(
            request("c.bin"),
            AppendOptions {
                destination: Destination::file(dir.path(), "fixed-name.bin"),
                timeout: Some(Duration::from_secs(30)),
            },
        )
        .await
        .unwrap();

    assert!(a < b && b < c, "ids are handed out in ascending order");

    let tasks = manager.tasks().await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(
        tasks.windows(2).all(|pair| pair[0].id < pair[1].id),
        "listing follows id order"
    );
    assert!(tasks.iter().all(|t| t.state == TaskState::Queued));
    assert!(tasks.iter().all(|t| t.started_at.is_none()));

    let snapshot = manager.task(c).await.unwrap().unwrap();
    assert_eq!(snapshot.destination_dir.as_deref(), Some(dir.path()));
    assert_eq!(snapshot.timeout, Some(Duration::from_secs(30)));
    assert_eq!(
        snapshot.resolved_name, None,
        "names resolve at admission, not at append"
    );
    assert!(snapshot.url.contains("c.bin"));

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.queued, 3);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.max_concurrent, 4);
    assert_eq!(manager.max_concurrent().await.unwrap(), 4);
    assert_eq!(manager.active_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_ids_are_handled_cleanly() {
    let manager = DownloadManager::new(Config::default()).unwrap();

    assert!(manager.task(TaskId::new(7)).await.unwrap().is_none());
    assert!(matches!(
        manager.start(TaskId::new(7)).await,
        Err(Error::UnknownId { id }) if id == 7
    ));
    assert!(matches!(
        manager.erase(TaskId::new(7)).await,
        Err(Error::UnknownId { .. })
    ));
    assert!(matches!(
        manager.restart(TaskId::new(7)).await,
        Err(Error::UnknownId { .. })
    ));
}

#[tokio::test]
async fn test_erase_and_clear_empty_the_queue() {
    let manager = DownloadManager::new(Config::default()).unwrap();

    let a = manager.append_buffered(request("a.bin")).await.unwrap();
    let b = manager.append_buffered(request("b.bin")).await.unwrap();
    let c = manager.append_buffered(request("c.bin")).await.unwrap();

    manager.erase(b).await.unwrap();
    assert!(manager.task(b).await.unwrap().is_none());
    assert_eq!(manager.stats().await.unwrap().total, 2);

    let removed = manager.clear().await.unwrap();
    assert_eq!(removed, 2);
    assert!(manager.tasks().await.unwrap().is_empty());
    assert!(manager.task(a).await.unwrap().is_none());

    // Ids never restart from zero, even after the registry empties
    let next = manager.append_buffered(request("d.bin")).await.unwrap();
    assert!(next > c);
}

#[tokio::test]
async fn test_bound_can_be_reconfigured_at_runtime() {
    let manager = DownloadManager::new(Config {
        max_concurrent: 2,
        ..Default::default()
    })
    .unwrap();

    assert_eq!(manager.max_concurrent().await.unwrap(), 2);
    manager.set_max_concurrent(8).await.unwrap();
    assert_eq!(manager.max_concurrent().await.unwrap(), 8);
    assert_eq!(manager.stats().await.unwrap().max_concurrent, 8);

    assert!(matches!(
        manager.set_max_concurrent(0).await,
        Err(Error::Config { .. })
    ));
    assert_eq!(manager.max_concurrent().await.unwrap(), 8);
}

#[tokio::test]
async fn test_invalid_config_fails_construction() {
    let result = DownloadManager::new(Config {
        max_concurrent: 0,
        ..Default::default()
    });
    assert!(matches!(result, Err(Error::Config { .. })));

    let result = DownloadManager::new(Config {
        event_channel_capacity: 0,
        ..Default::default()
    });
    assert!(result.is_err());
}

#[tokio::test]
async fn test_every_command_fails_after_shutdown() {
    let manager = DownloadManager::new(Config::default()).unwrap();
    let id = manager.append_buffered(request("a.bin")).await.unwrap();

    manager.shutdown().await;

    assert!(matches!(
        manager.append_buffered(request("b.bin")).await,
        Err(Error::ShuttingDown)
    ));
    assert!(matches!(manager.start(id).await, Err(Error::ShuttingDown)));
    assert!(matches!(manager.erase(id).await, Err(Error::ShuttingDown)));
    assert!(matches!(manager.clear().await, Err(Error::ShuttingDown)));
    assert!(matches!(manager.stats().await, Err(Error::ShuttingDown)));
    assert!(matches!(
        manager.task(id).await,
        Err(Error::ShuttingDown)
    ));

    // Shutdown is idempotent
    manager.shutdown().await;
}

#[tokio::test]
async fn test_clones_share_one_engine() {
    let manager = DownloadManager::new(Config::default()).unwrap();
    let other = manager.clone();

    let id = other.append_buffered(request("shared.bin")).await.unwrap();
    assert!(manager.task(id).await.unwrap().is_some());

    manager.shutdown().await;
    assert!(matches!(
        other.append_buffered(request("later.bin")).await,
        Err(Error::ShuttingDown)
    ));
}

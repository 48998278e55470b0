//! Scheduler integration tests: snapshot refresh, dispatch and degradation
//!
//! These tests drive a spawned SchedulerService through its handle:
//! - Stale snapshots keep dispatch running when refreshes fail
//! - A refresh failure with no snapshot at all marks the scheduler unhealthy
//! - One endpoint's enqueue failure never blocks the rest of the batch

use std::sync::Arc;
use std::time::Duration;

use sitewatch::cache::MemoryCache;
use sitewatch::config::SchedulerConfig;
use sitewatch::queue::{JobQueue, MemoryQueue};
use sitewatch::repo::MemoryRepository;
use sitewatch::services::scheduler::SchedulerHandle;

use crate::helpers::*;

/// Both timers fire once at spawn and then stay out of the way.
fn quiet_config() -> SchedulerConfig {
    SchedulerConfig {
        refresh_interval: Duration::from_secs(3600),
        dispatch_interval: Duration::from_secs(3600),
        op_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_stale_snapshot_keeps_dispatch_alive() {
    let inner = Arc::new(MemoryRepository::new());
    seed_fleet(&inner, &test_urls(42)).await;
    let repo = Arc::new(FailingRepo::new(inner));
    let cache = Arc::new(MemoryCache::new());
    let queue = Arc::new(MemoryQueue::new());

    let handle = SchedulerHandle::spawn(quiet_config(), repo.clone(), cache, queue.clone());

    // boot refresh and boot dispatch settle first
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.stats().await.unwrap().ready, 42);

    // refreshes start failing, but the cached snapshot still serves
    repo.fail_fleet(true);
    handle.refresh_now().await.unwrap();

    let health = handle.health().await.unwrap();
    assert!(
        health.healthy,
        "stale snapshot should keep the scheduler healthy"
    );
    assert!(health.last_error.is_some());

    let summary = handle.dispatch_now().await.unwrap();
    assert_eq!(summary.fleet_size, 42);
    assert_eq!(summary.batch_size, 50);
    assert_eq!(summary.enqueued, 42);
    assert_eq!(summary.skipped, 0);

    assert_eq!(queue.stats().await.unwrap().ready, 84);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_refresh_failure_without_snapshot_is_fatal() {
    let inner = Arc::new(MemoryRepository::new());
    seed_fleet(&inner, &test_urls(3)).await;
    let repo = Arc::new(FailingRepo::new(inner));
    repo.fail_fleet(true);

    let cache = Arc::new(MemoryCache::new());
    let queue = Arc::new(MemoryQueue::new());
    let handle = SchedulerHandle::spawn(quiet_config(), repo.clone(), cache, queue.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;

    // nothing can be dispatched without a snapshot
    assert_eq!(queue.stats().await.unwrap().ready, 0);
    assert!(handle.refresh_now().await.is_err());
    assert!(handle.dispatch_now().await.is_err());

    let health = handle.health().await.unwrap();
    assert!(!health.healthy, "no snapshot to fall back on is fatal");
    assert!(health.last_error.is_some());

    // the next successful refresh restores health and dispatch
    repo.fail_fleet(false);
    handle.refresh_now().await.unwrap();

    let health = handle.health().await.unwrap();
    assert!(health.healthy);
    assert!(health.last_error.is_none());

    let summary = handle.dispatch_now().await.unwrap();
    assert_eq!(summary.enqueued, 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_enqueue_failure_skips_only_that_endpoint() {
    let repo = Arc::new(MemoryRepository::new());
    let urls = test_urls(3);
    seed_fleet(&repo, &urls).await;

    let queue = Arc::new(FlakyQueue::rejecting(&urls[1]));
    let cache = Arc::new(MemoryCache::new());
    let handle = SchedulerHandle::spawn(quiet_config(), repo, cache, queue.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let summary = handle.dispatch_now().await.unwrap();
    assert_eq!(summary.fleet_size, 3);
    assert_eq!(summary.enqueued, 2);
    assert_eq!(summary.skipped, 1);

    // boot dispatch plus this one, each minus the rejected endpoint
    assert_eq!(queue.stats().await.unwrap().ready, 4);

    handle.shutdown().await;
}

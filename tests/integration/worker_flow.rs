//! Worker integration tests against live HTTP mocks
//!
//! - Slow 2xx responses come out the far end as DEGRADED probe logs
//! - A failing log write nacks the delivery until the queue gives up,
//!   and never acks without a landed write

use std::sync::Arc;
use std::time::Duration;

use sitewatch::config::WorkerConfig;
use sitewatch::queue::{Backoff, EnqueueOptions, JobQueue, MemoryQueue, PROBE_JOB_KIND};
use sitewatch::repo::MemoryRepository;
use sitewatch::services::worker::WorkerHandle;
use sitewatch::{ProbeJob, ProbeStatus};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn fast_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(10),
        ..WorkerConfig::default()
    }
}

fn probe_job(endpoint_id: &str, url: &str) -> ProbeJob {
    ProbeJob {
        endpoint_id: endpoint_id.to_string(),
        url: url.to_string(),
        timeout_ms: None,
    }
}

#[tokio::test]
async fn test_slow_response_is_recorded_degraded() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(2000)))
        .mount(&mock_server)
        .await;

    let repo = Arc::new(MemoryRepository::new());
    let (_user, endpoints) = seed_fleet(&repo, &[mock_server.uri()]).await;

    let queue = Arc::new(MemoryQueue::new());
    queue
        .enqueue(
            PROBE_JOB_KIND,
            probe_job(&endpoints[0], &mock_server.uri()),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    let handle = WorkerHandle::spawn(fast_config(), repo.clone(), queue.clone());

    assert!(
        wait_until(|| {
            let repo = repo.clone();
            async move { !repo.logs().await.is_empty() }
        })
        .await,
        "worker should record the probe"
    );

    let logs = repo.logs().await;
    assert_eq!(logs[0].status, ProbeStatus::Degraded);
    assert!(
        logs[0].response_time_ms.unwrap() >= 1500,
        "latency should reflect the delayed response"
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn test_failed_log_write_nacks_until_attempts_exhaust() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let inner = Arc::new(MemoryRepository::new());
    let (_user, endpoints) = seed_fleet(&inner, &[mock_server.uri()]).await;
    let repo = Arc::new(FailingRepo::new(inner.clone()));
    repo.fail_append(true);

    let queue = Arc::new(MemoryQueue::new());
    queue
        .enqueue(
            PROBE_JOB_KIND,
            probe_job(&endpoints[0], &mock_server.uri()),
            EnqueueOptions {
                attempts: 2,
                backoff: Backoff::Fixed {
                    delay: Duration::from_millis(100),
                },
                remove_on_complete: true,
                remove_on_fail: false,
            },
        )
        .await
        .unwrap();

    let handle = WorkerHandle::spawn(fast_config(), repo.clone(), queue.clone());

    // both deliveries nack, then the job lands in the failed set
    assert!(
        wait_until(|| {
            let queue = queue.clone();
            async move { queue.stats().await.unwrap().failed == 1 }
        })
        .await,
        "job should exhaust its attempts"
    );

    let failed = queue.failed_jobs().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts_made, 2);
    assert!(
        failed[0]
            .last_error
            .as_deref()
            .unwrap_or_default()
            .contains("log write refused")
    );

    // no ack without a landed write, so no log exists at all
    assert!(inner.logs().await.is_empty());
    assert_eq!(queue.stats().await.unwrap().completed, 0);

    handle.shutdown().await;
}

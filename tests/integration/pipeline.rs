//! End-to-end pipeline test
//!
//! Drives a probe outage through every stage: scheduler dispatch, queue
//! delivery, worker probes, analytics rollup and the owner alert.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sitewatch::cache::MemoryCache;
use sitewatch::config::{AlertingConfig, AnalyticsConfig, SchedulerConfig, WorkerConfig};
use sitewatch::email::MemoryMailer;
use sitewatch::queue::{JobQueue, MemoryQueue};
use sitewatch::repo::MemoryRepository;
use sitewatch::services::{
    alerting::AlertingHandle, analytics::AnalyticsHandle, scheduler::SchedulerHandle,
    worker::WorkerHandle,
};
use sitewatch::{AlertStatus, AlertType, PeriodType, ProbeStatus};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_pipeline_turns_an_outage_into_rollup_and_alert() {
    let mock_server = MockServer::start().await;
    // a 404 classifies as DOWN without any retries
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let repo = Arc::new(MemoryRepository::new());
    let (_user, endpoints) = seed_fleet(&repo, &[mock_server.uri()]).await;
    let endpoint = endpoints[0].clone();

    let cache = Arc::new(MemoryCache::new());
    let queue = Arc::new(MemoryQueue::new());
    let mailer = Arc::new(MemoryMailer::new());

    let scheduler = SchedulerHandle::spawn(
        SchedulerConfig {
            refresh_interval: Duration::from_secs(3600),
            dispatch_interval: Duration::from_secs(3600),
            op_timeout: Duration::from_secs(5),
        },
        repo.clone(),
        cache.clone(),
        queue.clone(),
    );
    let worker = WorkerHandle::spawn(
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
            ..WorkerConfig::default()
        },
        repo.clone(),
        queue.clone(),
    );
    let analytics = AnalyticsHandle::spawn(AnalyticsConfig::default(), repo.clone());
    let alerting = AlertingHandle::spawn(
        AlertingConfig {
            sweep_interval: Duration::from_secs(3600),
            ..AlertingConfig::default()
        },
        repo.clone(),
        cache.clone(),
        mailer.clone(),
    );

    // the boot dispatch enqueues one probe; eleven manual ticks make twelve
    tokio::time::sleep(Duration::from_millis(100)).await;
    for _ in 0..11 {
        let summary = scheduler.dispatch_now().await.unwrap();
        assert_eq!(summary.enqueued, 1);
    }

    assert!(
        wait_until(|| {
            let queue = queue.clone();
            async move { queue.stats().await.unwrap().completed == 12 }
        })
        .await,
        "worker should complete all twelve deliveries"
    );

    let logs = repo.logs().await;
    assert_eq!(logs.len(), 12);
    assert!(logs.iter().all(|log| log.status == ProbeStatus::Down));

    // twelve DOWN logs roll up to 100% downtime for today
    let summary = analytics.run_now(PeriodType::Daily).await.unwrap();
    assert_eq!(summary.rolled_up, 1);

    let start = PeriodType::Daily.bounds(Utc::now()).start;
    let rollup = repo.rollup(&endpoint, PeriodType::Daily, start).await.unwrap();
    assert_eq!(rollup.avg_downtime, 100.0);
    assert_eq!(rollup.avg_uptime, 0.0);

    // and the same window trips a downtime alert to the owner
    let sweep = alerting.check_now().await.unwrap();
    assert_eq!(sweep.alerted, 1);

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "owner@example.com");
    assert!(sent[0].subject.contains("DOWN"));

    let alerts = repo.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::Downtime);
    assert_eq!(alerts[0].status, AlertStatus::Sent);

    let queue_stats = queue.stats().await.unwrap();
    assert_eq!(queue_stats.ready, 0);
    assert_eq!(queue_stats.in_flight, 0);
    assert_eq!(queue_stats.failed, 0);

    scheduler.shutdown().await;
    alerting.shutdown().await;
    analytics.shutdown().await;
    worker.shutdown().await;
}

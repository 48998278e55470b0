//! Helper doubles and seed utilities for integration tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sitewatch::queue::{
    Delivery, EnqueueOptions, FailedJob, JobId, JobQueue, MemoryQueue, QueueError, QueueResult,
    QueueStats,
};
use sitewatch::repo::{
    ActiveMonitor, MemoryRepository, RepoError, RepoResult, Repository, ResponseTimeAggregate,
    StatusCounts,
};
use sitewatch::{
    AlertStatus, AlertType, Endpoint, FleetEndpoint, PeriodType, ProbeJob, ProbeLog, ProbeStatus,
    RollupMetrics, TimeRange,
};

/// Seed one owner with a single active monitor over `urls`, returning the
/// generated user id and endpoint ids.
pub async fn seed_fleet(repo: &MemoryRepository, urls: &[String]) -> (String, Vec<String>) {
    let user = repo.seed_user("owner@example.com").await;
    let monitor = repo.seed_monitor(&user, true).await;

    let mut endpoint_ids = Vec::with_capacity(urls.len());
    for url in urls {
        endpoint_ids.push(repo.seed_endpoint(&monitor, url).await);
    }

    (user, endpoint_ids)
}

pub fn test_urls(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("https://site-{i}.test")).collect()
}

/// Poll `check` every 50ms until it holds or ten seconds pass.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Repository wrapper whose fleet reads and log writes can be failed on demand
pub struct FailingRepo {
    inner: Arc<MemoryRepository>,
    fail_fleet: AtomicBool,
    fail_append: AtomicBool,
}

impl FailingRepo {
    pub fn new(inner: Arc<MemoryRepository>) -> Self {
        Self {
            inner,
            fail_fleet: AtomicBool::new(false),
            fail_append: AtomicBool::new(false),
        }
    }

    pub fn fail_fleet(&self, failing: bool) {
        self.fail_fleet.store(failing, Ordering::SeqCst);
    }

    pub fn fail_append(&self, failing: bool) {
        self.fail_append.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Repository for FailingRepo {
    async fn list_active_endpoints(&self) -> RepoResult<Vec<Endpoint>> {
        self.inner.list_active_endpoints().await
    }

    async fn list_fleet_endpoints(&self) -> RepoResult<Vec<FleetEndpoint>> {
        if self.fail_fleet.load(Ordering::SeqCst) {
            return Err(RepoError::QueryFailed("fleet query refused".to_string()));
        }
        self.inner.list_fleet_endpoints().await
    }

    async fn append_probe_log(
        &self,
        endpoint_id: &str,
        status: ProbeStatus,
        response_time_ms: Option<u64>,
    ) -> RepoResult<()> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(RepoError::QueryFailed("log write refused".to_string()));
        }
        self.inner
            .append_probe_log(endpoint_id, status, response_time_ms)
            .await
    }

    async fn logs_since(
        &self,
        endpoint_id: &str,
        since: DateTime<Utc>,
    ) -> RepoResult<Vec<ProbeLog>> {
        self.inner.logs_since(endpoint_id, since).await
    }

    async fn response_time_aggregate(
        &self,
        endpoint_id: &str,
        range: &TimeRange,
    ) -> RepoResult<ResponseTimeAggregate> {
        self.inner.response_time_aggregate(endpoint_id, range).await
    }

    async fn status_counts(&self, endpoint_id: &str, range: &TimeRange) -> RepoResult<StatusCounts> {
        self.inner.status_counts(endpoint_id, range).await
    }

    async fn upsert_rollup(
        &self,
        endpoint_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
        metrics: RollupMetrics,
    ) -> RepoResult<()> {
        self.inner
            .upsert_rollup(endpoint_id, period_type, period_start, metrics)
            .await
    }

    async fn append_alert(
        &self,
        endpoint_id: &str,
        alert_type: AlertType,
        status: AlertStatus,
        message: &str,
    ) -> RepoResult<()> {
        self.inner
            .append_alert(endpoint_id, alert_type, status, message)
            .await
    }

    async fn list_active_monitors(&self) -> RepoResult<Vec<ActiveMonitor>> {
        self.inner.list_active_monitors().await
    }

    async fn prune_logs(&self, before: DateTime<Utc>) -> RepoResult<u64> {
        self.inner.prune_logs(before).await
    }

    async fn prune_rollups(&self, before: DateTime<Utc>) -> RepoResult<u64> {
        self.inner.prune_rollups(before).await
    }

    async fn ping(&self) -> RepoResult<()> {
        self.inner.ping().await
    }
}

/// Queue wrapper that rejects enqueues for one specific URL
pub struct FlakyQueue {
    inner: MemoryQueue,
    reject_url: String,
}

impl FlakyQueue {
    pub fn rejecting(url: &str) -> Self {
        Self {
            inner: MemoryQueue::new(),
            reject_url: url.to_string(),
        }
    }
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn enqueue(
        &self,
        kind: &str,
        payload: ProbeJob,
        opts: EnqueueOptions,
    ) -> QueueResult<JobId> {
        if payload.url == self.reject_url {
            return Err(QueueError::Backend("enqueue refused".to_string()));
        }
        self.inner.enqueue(kind, payload, opts).await
    }

    async fn claim(&self, lease: Duration) -> QueueResult<Option<Delivery>> {
        self.inner.claim(lease).await
    }

    async fn ack(&self, id: JobId) -> QueueResult<()> {
        self.inner.ack(id).await
    }

    async fn nack(&self, id: JobId, error: &str) -> QueueResult<()> {
        self.inner.nack(id, error).await
    }

    async fn renew_lease(&self, id: JobId, lease: Duration) -> QueueResult<()> {
        self.inner.renew_lease(id, lease).await
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        self.inner.stats().await
    }

    async fn failed_jobs(&self) -> QueueResult<Vec<FailedJob>> {
        self.inner.failed_jobs().await
    }

    async fn ping(&self) -> QueueResult<()> {
        self.inner.ping().await
    }
}

//! Repository trait definition
//!
//! This module defines the core `Repository` trait that all
//! persistent-store implementations must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    AlertStatus, AlertType, Endpoint, FleetEndpoint, PeriodType, ProbeLog, ProbeStatus,
    RollupMetrics, TimeRange,
};

use super::error::RepoResult;

/// Aggregate over response times in a window
#[derive(Debug, Clone, Copy)]
pub struct ResponseTimeAggregate {
    /// Average over probes with a recorded response time, `None` if there are none
    pub avg_response_time: Option<f64>,

    /// Number of probe logs in the window, including those without a response time
    pub total_logs: u64,
}

/// Per-status probe counts in a window
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCounts {
    pub up: u64,
    pub down: u64,
    pub degraded: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.up + self.down + self.degraded
    }
}

/// An active monitor joined with its owner and endpoints
///
/// This is the unit the alerting sweep iterates: each endpoint is
/// evaluated on behalf of the owning user, so cooldown flags and alert
/// emails can be addressed per (user, endpoint) pair.
#[derive(Debug, Clone)]
pub struct ActiveMonitor {
    /// Monitor identifier
    pub monitor_id: String,

    /// Owning user identifier
    pub user_id: String,

    /// Owning user's email address (alert recipient)
    pub user_email: String,

    /// Endpoints grouped under this monitor
    pub endpoints: Vec<Endpoint>,
}

/// Trait for the persistent store the pipeline reads from and writes to
///
/// The trait is deliberately narrow: it names exactly the queries the
/// scheduler, worker pool, aggregator and alerting engine need, rather
/// than exposing a generic data-access surface.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they will be shared
/// across async tasks behind an `Arc`.
///
/// ## Error Handling
///
/// Methods return `RepoResult<T>` which wraps `RepoError`.
/// Writes that reference a missing row must be rejected with
/// `RepoError::MissingRow`, not silently dropped.
#[async_trait]
pub trait Repository: Send + Sync {
    /// List every endpoint reachable from an active monitor
    ///
    /// Order is stable across calls so batch partitioning is deterministic.
    async fn list_active_endpoints(&self) -> RepoResult<Vec<Endpoint>>;

    /// List active endpoints with their monitor flag, for the fleet snapshot
    async fn list_fleet_endpoints(&self) -> RepoResult<Vec<FleetEndpoint>>;

    /// Append one probe log for an endpoint, stamped with the store's clock
    ///
    /// `response_time_ms` is `None` when the probe never got a response.
    async fn append_probe_log(
        &self,
        endpoint_id: &str,
        status: ProbeStatus,
        response_time_ms: Option<u64>,
    ) -> RepoResult<()>;

    /// Fetch probe logs at or after `since`, ordered newest-first
    async fn logs_since(
        &self,
        endpoint_id: &str,
        since: DateTime<Utc>,
    ) -> RepoResult<Vec<ProbeLog>>;

    /// Average response time and total log count within a range
    async fn response_time_aggregate(
        &self,
        endpoint_id: &str,
        range: &TimeRange,
    ) -> RepoResult<ResponseTimeAggregate>;

    /// Per-status log counts within a range
    async fn status_counts(
        &self,
        endpoint_id: &str,
        range: &TimeRange,
    ) -> RepoResult<StatusCounts>;

    /// Insert or replace the rollup keyed by (endpoint, period type, period start)
    ///
    /// Reprocessing a period overwrites the previous row, so the
    /// aggregator can rerun a period without duplicating history.
    async fn upsert_rollup(
        &self,
        endpoint_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
        metrics: RollupMetrics,
    ) -> RepoResult<()>;

    /// Append one alert record for an endpoint
    async fn append_alert(
        &self,
        endpoint_id: &str,
        alert_type: AlertType,
        status: AlertStatus,
        message: &str,
    ) -> RepoResult<()>;

    /// List active monitors joined with their owners and endpoints
    async fn list_active_monitors(&self) -> RepoResult<Vec<ActiveMonitor>>;

    /// Delete probe logs older than `before`, returning the number removed
    async fn prune_logs(&self, before: DateTime<Utc>) -> RepoResult<u64>;

    /// Delete rollups whose period started before `before`, returning the number removed
    async fn prune_rollups(&self, before: DateTime<Utc>) -> RepoResult<u64>;

    /// Verify the store is reachable
    async fn ping(&self) -> RepoResult<()>;
}

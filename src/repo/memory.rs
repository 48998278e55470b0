//! In-memory repository (no persistence)
//!
//! Backs the demo binary and the test suite. All data is lost on
//! restart. Rows live in plain vectors so listing order is insertion
//! order, which keeps batch partitioning deterministic.
//!
//! ## Limitations
//!
//! - **No persistence**: everything is gone when the process exits
//! - **Linear scans**: queries walk the full log vector, fine for the
//!   volumes a single demo process produces

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    AlertRecord, AlertStatus, AlertType, Endpoint, FleetEndpoint, PeriodType, ProbeLog,
    ProbeStatus, RollupMetrics, TimeRange,
};

use super::error::{RepoError, RepoResult};
use super::repository::{ActiveMonitor, Repository, ResponseTimeAggregate, StatusCounts};

struct UserRow {
    id: String,
    email: String,
}

struct MonitorRow {
    id: String,
    user_id: String,
    is_active: bool,
    endpoint_ids: Vec<String>,
}

struct EndpointRow {
    id: String,
    url: String,
}

#[derive(Default)]
struct RepoState {
    users: Vec<UserRow>,
    monitors: Vec<MonitorRow>,
    endpoints: Vec<EndpointRow>,
    logs: Vec<ProbeLog>,
    rollups: HashMap<(String, PeriodType, DateTime<Utc>), RollupMetrics>,
    alerts: Vec<AlertRecord>,
    next_id: u64,
}

impl RepoState {
    fn mint(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }

    fn has_endpoint(&self, endpoint_id: &str) -> bool {
        self.endpoints.iter().any(|ep| ep.id == endpoint_id)
    }

    /// An endpoint is active when at least one active monitor references it.
    fn is_active(&self, endpoint_id: &str) -> bool {
        self.monitors
            .iter()
            .any(|m| m.is_active && m.endpoint_ids.iter().any(|id| id == endpoint_id))
    }
}

/// In-memory repository
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<RepoState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user, returning its generated id.
    pub async fn seed_user(&self, email: &str) -> String {
        let mut state = self.state.write().await;
        let id = state.mint("usr");
        state.users.push(UserRow {
            id: id.clone(),
            email: email.to_string(),
        });
        id
    }

    /// Insert a monitor owned by `user_id`, returning its generated id.
    pub async fn seed_monitor(&self, user_id: &str, is_active: bool) -> String {
        let mut state = self.state.write().await;
        let id = state.mint("mon");
        state.monitors.push(MonitorRow {
            id: id.clone(),
            user_id: user_id.to_string(),
            is_active,
            endpoint_ids: Vec::new(),
        });
        id
    }

    /// Insert an endpoint attached to `monitor_id`, returning its generated id.
    pub async fn seed_endpoint(&self, monitor_id: &str, url: &str) -> String {
        let mut state = self.state.write().await;
        let id = state.mint("ep");
        state.endpoints.push(EndpointRow {
            id: id.clone(),
            url: url.to_string(),
        });
        if let Some(monitor) = state.monitors.iter_mut().find(|m| m.id == monitor_id) {
            monitor.endpoint_ids.push(id.clone());
        }
        id
    }

    /// Flip a monitor's active flag.
    pub async fn set_monitor_active(&self, monitor_id: &str, active: bool) {
        let mut state = self.state.write().await;
        if let Some(monitor) = state.monitors.iter_mut().find(|m| m.id == monitor_id) {
            monitor.is_active = active;
        }
    }

    /// Insert a probe log with an explicit timestamp, bypassing the store clock.
    pub async fn insert_log_at(
        &self,
        endpoint_id: &str,
        status: ProbeStatus,
        response_time_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    ) {
        let mut state = self.state.write().await;
        state.logs.push(ProbeLog {
            endpoint_id: endpoint_id.to_string(),
            status,
            response_time_ms,
            timestamp,
        });
    }

    /// Snapshot of all stored probe logs, in insertion order.
    pub async fn logs(&self) -> Vec<ProbeLog> {
        self.state.read().await.logs.clone()
    }

    /// Snapshot of all stored alert records, in insertion order.
    pub async fn alerts(&self) -> Vec<AlertRecord> {
        self.state.read().await.alerts.clone()
    }

    /// Look up a single rollup by its key.
    pub async fn rollup(
        &self,
        endpoint_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> Option<RollupMetrics> {
        self.state
            .read()
            .await
            .rollups
            .get(&(endpoint_id.to_string(), period_type, period_start))
            .copied()
    }

    pub async fn rollup_count(&self) -> usize {
        self.state.read().await.rollups.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_active_endpoints(&self) -> RepoResult<Vec<Endpoint>> {
        let state = self.state.read().await;

        Ok(state
            .endpoints
            .iter()
            .filter(|ep| state.is_active(&ep.id))
            .map(|ep| Endpoint {
                id: ep.id.clone(),
                url: ep.url.clone(),
            })
            .collect())
    }

    async fn list_fleet_endpoints(&self) -> RepoResult<Vec<FleetEndpoint>> {
        let state = self.state.read().await;

        // inclusion already implies an active monitor
        Ok(state
            .endpoints
            .iter()
            .filter(|ep| state.is_active(&ep.id))
            .map(|ep| FleetEndpoint {
                id: ep.id.clone(),
                url: ep.url.clone(),
                monitor_active: true,
            })
            .collect())
    }

    async fn append_probe_log(
        &self,
        endpoint_id: &str,
        status: ProbeStatus,
        response_time_ms: Option<u64>,
    ) -> RepoResult<()> {
        let mut state = self.state.write().await;

        if !state.has_endpoint(endpoint_id) {
            return Err(RepoError::MissingRow(format!(
                "endpoint {endpoint_id} does not exist"
            )));
        }

        state.logs.push(ProbeLog {
            endpoint_id: endpoint_id.to_string(),
            status,
            response_time_ms,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn logs_since(
        &self,
        endpoint_id: &str,
        since: DateTime<Utc>,
    ) -> RepoResult<Vec<ProbeLog>> {
        let state = self.state.read().await;

        let mut logs: Vec<ProbeLog> = state
            .logs
            .iter()
            .filter(|log| log.endpoint_id == endpoint_id && log.timestamp >= since)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(logs)
    }

    async fn response_time_aggregate(
        &self,
        endpoint_id: &str,
        range: &TimeRange,
    ) -> RepoResult<ResponseTimeAggregate> {
        let state = self.state.read().await;

        let mut total_logs = 0u64;
        let mut samples = 0u64;
        let mut sum = 0.0f64;

        for log in &state.logs {
            if log.endpoint_id != endpoint_id || !range.contains(log.timestamp) {
                continue;
            }
            total_logs += 1;
            if let Some(rt) = log.response_time_ms {
                samples += 1;
                sum += rt as f64;
            }
        }

        let avg_response_time = (samples > 0).then(|| sum / samples as f64);
        Ok(ResponseTimeAggregate {
            avg_response_time,
            total_logs,
        })
    }

    async fn status_counts(
        &self,
        endpoint_id: &str,
        range: &TimeRange,
    ) -> RepoResult<StatusCounts> {
        let state = self.state.read().await;

        let mut counts = StatusCounts::default();
        for log in &state.logs {
            if log.endpoint_id != endpoint_id || !range.contains(log.timestamp) {
                continue;
            }
            match log.status {
                ProbeStatus::Up => counts.up += 1,
                ProbeStatus::Down => counts.down += 1,
                ProbeStatus::Degraded => counts.degraded += 1,
            }
        }

        Ok(counts)
    }

    async fn upsert_rollup(
        &self,
        endpoint_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
        metrics: RollupMetrics,
    ) -> RepoResult<()> {
        let mut state = self.state.write().await;
        state
            .rollups
            .insert((endpoint_id.to_string(), period_type, period_start), metrics);
        Ok(())
    }

    async fn append_alert(
        &self,
        endpoint_id: &str,
        alert_type: AlertType,
        status: AlertStatus,
        message: &str,
    ) -> RepoResult<()> {
        let mut state = self.state.write().await;

        if !state.has_endpoint(endpoint_id) {
            return Err(RepoError::MissingRow(format!(
                "endpoint {endpoint_id} does not exist"
            )));
        }

        state.alerts.push(AlertRecord {
            endpoint_id: endpoint_id.to_string(),
            alert_type,
            status,
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_active_monitors(&self) -> RepoResult<Vec<ActiveMonitor>> {
        let state = self.state.read().await;

        let mut result = Vec::new();
        for monitor in state.monitors.iter().filter(|m| m.is_active) {
            let Some(user) = state.users.iter().find(|u| u.id == monitor.user_id) else {
                return Err(RepoError::MissingRow(format!(
                    "user {} for monitor {}",
                    monitor.user_id, monitor.id
                )));
            };

            let endpoints = monitor
                .endpoint_ids
                .iter()
                .filter_map(|id| state.endpoints.iter().find(|ep| &ep.id == id))
                .map(|ep| Endpoint {
                    id: ep.id.clone(),
                    url: ep.url.clone(),
                })
                .collect();

            result.push(ActiveMonitor {
                monitor_id: monitor.id.clone(),
                user_id: monitor.user_id.clone(),
                user_email: user.email.clone(),
                endpoints,
            });
        }

        Ok(result)
    }

    async fn prune_logs(&self, before: DateTime<Utc>) -> RepoResult<u64> {
        let mut state = self.state.write().await;

        let before_len = state.logs.len();
        state.logs.retain(|log| log.timestamp >= before);
        Ok((before_len - state.logs.len()) as u64)
    }

    async fn prune_rollups(&self, before: DateTime<Utc>) -> RepoResult<u64> {
        let mut state = self.state.write().await;

        let before_len = state.rollups.len();
        state.rollups.retain(|(_, _, start), _| *start >= before);
        Ok((before_len - state.rollups.len()) as u64)
    }

    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }
}

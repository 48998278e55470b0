//! AnalyticsService - windowed rollups over raw probe history
//!
//! Closes out daily, monthly and yearly periods by folding each active
//! endpoint's probe logs into one `AnalyticsRollup` row per period.
//!
//! ## Key Features
//!
//! 1. **Period-close timers** - Each period type fires once just before
//!    its calendar boundary, rolling up the period that is ending
//! 2. **Bounded fan-out** - Endpoints are rolled up in concurrent waves
//!    of a fixed batch size
//! 3. **Zero rollups** - An endpoint with no logs in the period still
//!    gets a row; absence of data is itself a reportable fact
//! 4. **Idempotent reprocessing** - Rollups are upserted by
//!    (endpoint, period type, period start), so reruns overwrite
//!
//! ## Message Flow
//!
//! ```text
//! Period close (daily/monthly/yearly) → aggregate logs → upsert rollups
//!     ↑
//!     └─── Commands (RunNow, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::config::AnalyticsConfig;
use crate::repo::{Repository, ResponseTimeAggregate, StatusCounts};
use crate::{PeriodType, RollupMetrics, TimeRange};

use super::messages::{AnalyticsCommand, RollupRunSummary};

/// Fold aggregates into rollup metrics
///
/// An empty period produces the zero rollup rather than nothing. With
/// logs present, the three percentages partition the total since every
/// log carries exactly one status.
pub fn compute_metrics(aggregate: ResponseTimeAggregate, counts: StatusCounts) -> RollupMetrics {
    if aggregate.total_logs == 0 {
        return RollupMetrics::default();
    }

    let total = aggregate.total_logs as f64;
    RollupMetrics {
        avg_response_time: aggregate.avg_response_time.unwrap_or(0.0),
        avg_uptime: counts.up as f64 / total * 100.0,
        avg_downtime: counts.down as f64 / total * 100.0,
        avg_degraded_time: counts.degraded as f64 / total * 100.0,
    }
}

fn until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Service that rolls probe history into per-period analytics
pub struct AnalyticsService {
    /// Batching policy
    config: AnalyticsConfig,

    /// Source of logs and sink of rollups
    repo: Arc<dyn Repository>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<AnalyticsCommand>,
}

impl AnalyticsService {
    pub fn new(
        config: AnalyticsConfig,
        repo: Arc<dyn Repository>,
        command_rx: mpsc::Receiver<AnalyticsCommand>,
    ) -> Self {
        Self {
            config,
            repo,
            command_rx,
        }
    }

    /// Run the service's main loop
    ///
    /// Close instants are recomputed every iteration, so each period
    /// type fires exactly once per period. The close instant itself is
    /// passed to processing, so a slow wakeup cannot slide the rollup
    /// into the next period.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting analytics service");

        loop {
            let now = Utc::now();
            let daily_close = PeriodType::Daily.next_close(now);
            let monthly_close = PeriodType::Monthly.next_close(now);
            let yearly_close = PeriodType::Yearly.next_close(now);

            tokio::select! {
                // Period-close timers - roll up the period that is ending
                _ = sleep(until(now, daily_close)) => {
                    self.close_period(PeriodType::Daily, daily_close).await;
                }

                _ = sleep(until(now, monthly_close)) => {
                    self.close_period(PeriodType::Monthly, monthly_close).await;
                }

                _ = sleep(until(now, yearly_close)) => {
                    self.close_period(PeriodType::Yearly, yearly_close).await;
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        AnalyticsCommand::RunNow { period, respond_to } => {
                            debug!("received RunNow command for {period}");
                            let result = self.process_period(period, Utc::now()).await;
                            let _ = respond_to.send(result);
                        }

                        AnalyticsCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                // Command channel closed - exit
                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("analytics service stopped");
    }

    async fn close_period(&self, period: PeriodType, at: DateTime<Utc>) {
        match self.process_period(period, at).await {
            Ok(summary) => debug!(
                "rolled up {} of {} endpoints for the {period} period starting {}",
                summary.rolled_up, summary.endpoints, summary.period_start
            ),
            Err(e) => error!("{period} rollup failed: {:#}", e),
        }
    }

    /// Roll up every active endpoint for the period containing `at`
    ///
    /// Endpoints are processed in concurrent waves; one endpoint's
    /// failure is counted and skipped without touching its siblings.
    #[instrument(skip(self), fields(period = %period))]
    async fn process_period(
        &self,
        period: PeriodType,
        at: DateTime<Utc>,
    ) -> Result<RollupRunSummary> {
        let range = period.bounds(at);
        let endpoints = self.repo.list_active_endpoints().await?;

        let mut summary = RollupRunSummary {
            period,
            period_start: range.start,
            endpoints: endpoints.len(),
            rolled_up: 0,
            failed: 0,
        };

        let started = std::time::Instant::now();
        for batch in endpoints.chunks(self.config.batch_size.max(1)) {
            let rollups = batch
                .iter()
                .map(|endpoint| self.rollup_endpoint(&endpoint.id, period, &range));

            for (endpoint, result) in batch.iter().zip(join_all(rollups).await) {
                match result {
                    Ok(()) => summary.rolled_up += 1,
                    Err(e) => {
                        warn!("rollup failed for {}: {:#}", endpoint.id, e);
                        summary.failed += 1;
                    }
                }
            }
        }

        debug!(
            "computed {} {period} rollups in {:?}",
            summary.rolled_up,
            started.elapsed()
        );
        Ok(summary)
    }

    /// Compute and upsert one endpoint's rollup for the range
    async fn rollup_endpoint(
        &self,
        endpoint_id: &str,
        period: PeriodType,
        range: &TimeRange,
    ) -> Result<()> {
        let aggregate = self.repo.response_time_aggregate(endpoint_id, range).await?;
        let counts = self.repo.status_counts(endpoint_id, range).await?;
        let metrics = compute_metrics(aggregate, counts);

        self.repo
            .upsert_rollup(endpoint_id, period, range.start, metrics)
            .await?;
        Ok(())
    }
}

/// Handle for controlling an AnalyticsService
#[derive(Clone)]
pub struct AnalyticsHandle {
    sender: mpsc::Sender<AnalyticsCommand>,
}

impl AnalyticsHandle {
    /// Spawn an analytics service over the given repository
    pub fn spawn(config: AnalyticsConfig, repo: Arc<dyn Repository>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let service = AnalyticsService::new(config, repo, cmd_rx);

        tokio::spawn(service.run());

        Self { sender: cmd_tx }
    }

    /// Roll up the period of the given type containing now
    pub async fn run_now(&self, period: PeriodType) -> Result<RollupRunSummary> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AnalyticsCommand::RunNow {
                period,
                respond_to: tx,
            })
            .await?;

        rx.await?
    }

    /// Shut down the aggregator
    pub async fn shutdown(self) {
        let _ = self.sender.send(AnalyticsCommand::Shutdown).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

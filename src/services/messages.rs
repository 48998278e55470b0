//! Message types for service communication
//!
//! Each pipeline service owns an mpsc command channel. Commands that
//! answer carry a oneshot sender; summaries returned through them are
//! plain cloneable data so callers can log or assert on them freely.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::PeriodType;

/// Commands that can be sent to the SchedulerService
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Refresh the fleet snapshot immediately (bypassing the refresh timer)
    RefreshNow {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Run one dispatch tick immediately (bypassing the dispatch timer)
    DispatchNow {
        respond_to: oneshot::Sender<anyhow::Result<DispatchSummary>>,
    },

    /// Get the scheduler's current health
    GetHealth {
        respond_to: oneshot::Sender<SchedulerHealth>,
    },

    /// Gracefully shut down the scheduler
    Shutdown,
}

/// Outcome of one dispatch tick
#[derive(Debug, Clone, Copy)]
pub struct DispatchSummary {
    /// Endpoints in the snapshot used for this tick
    pub fleet_size: usize,

    /// Batch size chosen for this fleet
    pub batch_size: usize,

    /// Jobs successfully enqueued
    pub enqueued: usize,

    /// Endpoints skipped because their enqueue failed
    pub skipped: usize,
}

/// Scheduler health, as reported to operators
///
/// The scheduler goes unhealthy only when a refresh failed and no
/// snapshot exists to fall back on, leaving dispatch with nothing
/// to work from.
#[derive(Debug, Clone)]
pub struct SchedulerHealth {
    pub healthy: bool,

    /// When the snapshot was last written
    pub last_refresh: Option<DateTime<Utc>>,

    /// Most recent refresh error, if any
    pub last_error: Option<String>,
}

/// Commands that can be sent to the WorkerService
#[derive(Debug)]
pub enum WorkerCommand {
    /// Get processing counters
    GetStats {
        respond_to: oneshot::Sender<WorkerStats>,
    },

    /// Drain in-flight jobs within the grace period, then stop
    ///
    /// The response fires once the worker has stopped, whether the
    /// drain completed or jobs had to be abandoned.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Worker processing counters
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStats {
    /// Deliveries taken from the queue
    pub processed: u64,

    /// Deliveries acked after a recorded probe
    pub succeeded: u64,

    /// Deliveries nacked because the log write failed
    pub failed: u64,

    /// Jobs currently executing
    pub in_flight: usize,
}

/// Commands that can be sent to the AnalyticsService
#[derive(Debug)]
pub enum AnalyticsCommand {
    /// Roll up the period of the given type containing the current time
    RunNow {
        period: PeriodType,
        respond_to: oneshot::Sender<anyhow::Result<RollupRunSummary>>,
    },

    /// Gracefully shut down the aggregator
    Shutdown,
}

/// Outcome of one rollup run
#[derive(Debug, Clone, Copy)]
pub struct RollupRunSummary {
    pub period: PeriodType,

    /// Start of the period that was rolled up
    pub period_start: DateTime<Utc>,

    /// Active endpoints considered
    pub endpoints: usize,

    /// Rollups upserted
    pub rolled_up: usize,

    /// Endpoints whose rollup failed
    pub failed: usize,
}

/// Commands that can be sent to the AlertingService
#[derive(Debug)]
pub enum AlertingCommand {
    /// Run one alert sweep immediately (bypassing the sweep timer)
    CheckNow {
        respond_to: oneshot::Sender<anyhow::Result<AlertSweepSummary>>,
    },

    /// Gracefully shut down the alerting engine
    Shutdown,
}

/// Outcome of one alert sweep
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertSweepSummary {
    /// Endpoints evaluated
    pub checked: usize,

    /// Alerts sent and recorded
    pub alerted: usize,

    /// Breaches suppressed by an active cooldown
    pub suppressed: usize,

    /// Endpoints skipped for insufficient signal
    pub skipped: usize,

    /// Endpoints whose evaluation errored
    pub failed: usize,
}

/// Commands that can be sent to the RetentionService
#[derive(Debug)]
pub enum RetentionCommand {
    /// Run one prune pass immediately
    PruneNow {
        respond_to: oneshot::Sender<anyhow::Result<PruneSummary>>,
    },

    /// Gracefully shut down the retention service
    Shutdown,
}

/// Outcome of one prune pass
#[derive(Debug, Clone, Copy)]
pub struct PruneSummary {
    pub logs_removed: u64,
    pub rollups_removed: u64,
}

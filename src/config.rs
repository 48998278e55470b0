//! Runtime configuration for the monitoring pipeline
//!
//! Every knob ships with its production default and can be overridden
//! through the environment, so a deployment tunes the pipeline without
//! a rebuild. The demo fleet itself comes from a JSON seed file that is
//! read once at startup.

use std::time::Duration;

use tracing::trace;

use crate::probe::RetryPolicy;
use crate::util::{env_f64, env_ms, env_secs, env_string, env_u32, env_u64};

/// Scheduler timing and cache policy
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fleet-refresh period; doubles as the snapshot TTL
    pub refresh_interval: Duration,

    /// Dispatch period
    pub dispatch_interval: Duration,

    /// Upper bound on any single cache/store/queue call
    pub op_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(1800),
            dispatch_interval: Duration::from_secs(60),
            op_timeout: Duration::from_secs(10),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            refresh_interval: env_secs("FLEET_REFRESH_SECS", 1800),
            dispatch_interval: env_secs("DISPATCH_INTERVAL_SECS", 60),
            op_timeout: env_secs("SCHEDULER_OP_TIMEOUT_SECS", 10),
        }
    }
}

/// Worker pool sizing, rate limiting and lease policy
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs executed in parallel
    pub concurrency: usize,

    /// Job starts allowed per rate-limit window
    pub rate_limit_max: u32,

    /// Width of the rate-limit window
    pub rate_limit_window: Duration,

    /// Lease taken per claimed job; an expired lease makes the job
    /// re-deliverable
    pub lease: Duration,

    /// How often an in-progress job renews its lease (roughly half the
    /// lease duration)
    pub renew_interval: Duration,

    /// Idle delay between claim attempts when the queue is empty
    pub poll_interval: Duration,

    /// Default probe request timeout, overridable per job
    pub probe_timeout: Duration,

    /// Response-time threshold separating UP from DEGRADED, in milliseconds
    pub threshold_ms: u64,

    /// Transport-level retry policy for probes
    pub retry: RetryPolicy,

    /// Upper bound on the probe-log write
    pub write_timeout: Duration,

    /// How long shutdown waits for in-flight jobs before abandoning them
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            rate_limit_max: 100,
            rate_limit_window: Duration::from_millis(1000),
            lease: Duration::from_millis(30_000),
            renew_interval: Duration::from_millis(15_000),
            poll_interval: Duration::from_millis(250),
            probe_timeout: Duration::from_millis(30_000),
            threshold_ms: 750,
            retry: RetryPolicy::default(),
            write_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_millis(5000),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_u64("PROBE_CONCURRENCY", 5) as usize,
            rate_limit_max: env_u32("PROBE_RATE_LIMIT_MAX", 100),
            rate_limit_window: env_ms("PROBE_RATE_LIMIT_WINDOW_MS", 1000),
            lease: env_ms("JOB_LEASE_MS", 30_000),
            renew_interval: env_ms("JOB_LEASE_RENEW_MS", 15_000),
            poll_interval: env_ms("QUEUE_POLL_MS", 250),
            probe_timeout: env_ms("PROBE_TIMEOUT_MS", 30_000),
            threshold_ms: env_u64("DEGRADED_THRESHOLD_MS", 750),
            retry: RetryPolicy {
                max_attempts: env_u32("PROBE_RETRY_ATTEMPTS", 3),
                min_delay: env_ms("PROBE_RETRY_MIN_DELAY_MS", 500),
                ..defaults.retry
            },
            write_timeout: env_secs("LOG_WRITE_TIMEOUT_SECS", 10),
            shutdown_grace: env_ms("SHUTDOWN_GRACE_MS", 5000),
        }
    }
}

/// Aggregator batching
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Endpoints rolled up concurrently per wave
    pub batch_size: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { batch_size: 5 }
    }
}

impl AnalyticsConfig {
    pub fn from_env() -> Self {
        Self {
            batch_size: env_u64("ROLLUP_BATCH_SIZE", 5) as usize,
        }
    }
}

/// Alerting cadence, window and thresholds
#[derive(Debug, Clone)]
pub struct AlertingConfig {
    /// How often the sweep runs
    pub sweep_interval: Duration,

    /// Evaluation window looking back from now
    pub window: Duration,

    /// Minimum logs in the window before an endpoint is judged at all
    pub min_logs: usize,

    /// Problematic percentage at or above which an alert fires
    pub threshold_pct: f64,

    /// Cooldown flag TTL after a sent alert
    pub cooldown_ttl: Duration,

    /// Endpoints evaluated concurrently per wave
    pub sweep_batch: usize,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            window: Duration::from_secs(900),
            min_logs: 10,
            threshold_pct: 80.0,
            cooldown_ttl: Duration::from_secs(1800),
            sweep_batch: 10,
        }
    }
}

impl AlertingConfig {
    pub fn from_env() -> Self {
        Self {
            sweep_interval: env_secs("ALERT_SWEEP_SECS", 60),
            window: env_secs("ALERT_WINDOW_SECS", 900),
            min_logs: env_u64("ALERT_MIN_LOGS", 10) as usize,
            threshold_pct: env_f64("ALERT_THRESHOLD_PCT", 80.0),
            cooldown_ttl: env_secs("ALERT_COOLDOWN_SECS", 1800),
            sweep_batch: env_u64("ALERT_SWEEP_BATCH", 10) as usize,
        }
    }
}

/// History retention horizons
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// How often the prune pass runs
    pub prune_interval: Duration,

    /// Probe logs older than this many months are deleted
    pub log_horizon_months: u32,

    /// Rollups whose period started more than this many months ago are deleted
    pub rollup_horizon_months: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            prune_interval: Duration::from_secs(86_400),
            log_horizon_months: 18,
            rollup_horizon_months: 12,
        }
    }
}

impl RetentionConfig {
    pub fn from_env() -> Self {
        Self {
            prune_interval: env_secs("RETENTION_PRUNE_SECS", 86_400),
            log_horizon_months: env_u32("LOG_RETENTION_MONTHS", 18),
            rollup_horizon_months: env_u32("ROLLUP_RETENTION_MONTHS", 12),
        }
    }
}

/// Outbound email settings
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Webhook receiving alert mail as JSON; `None` keeps mail in memory
    pub webhook_url: Option<String>,

    /// Sender address stamped on every alert
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            from: "alerts@sitewatch.local".to_string(),
        }
    }
}

impl EmailConfig {
    pub fn from_env() -> Self {
        Self {
            webhook_url: env_string("ALERT_EMAIL_WEBHOOK_URL"),
            from: env_string("ALERT_EMAIL_FROM")
                .unwrap_or_else(|| "alerts@sitewatch.local".to_string()),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub analytics: AnalyticsConfig,
    pub alerting: AlertingConfig,
    pub retention: RetentionConfig,
    pub email: EmailConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            scheduler: SchedulerConfig::from_env(),
            worker: WorkerConfig::from_env(),
            analytics: AnalyticsConfig::from_env(),
            alerting: AlertingConfig::from_env(),
            retention: RetentionConfig::from_env(),
            email: EmailConfig::from_env(),
        }
    }
}

/// Demo fleet description
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SeedFile {
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SeedUser {
    pub email: String,
    pub monitors: Vec<SeedMonitor>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SeedMonitor {
    #[serde(default = "default_monitor_active")]
    pub active: bool,
    pub endpoints: Vec<String>,
}

fn default_monitor_active() -> bool {
    true
}

pub fn read_seed_file(path: &str) -> anyhow::Result<SeedFile> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid seed file provided!"))
        .inspect(|seed| trace!("loaded seed: {seed:?}"))
}

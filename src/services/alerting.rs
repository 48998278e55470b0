//! AlertingService - threshold detection with cooldown deduplication
//!
//! Sweeps every endpoint reachable from an active monitor on a fixed
//! cadence, judges its recent probe window, and notifies the owning
//! user at most once per cooldown period.
//!
//! ## Key Features
//!
//! 1. **Windowed judgement** - Only the last 15 minutes of logs count,
//!    and fewer than 10 logs is treated as insufficient signal
//! 2. **Predominant status** - DOWN must strictly outnumber DEGRADED
//!    among problematic logs to call the incident a downtime; ties read
//!    as a performance problem
//! 3. **Cooldown flags** - A TTL'd cache flag per (user, endpoint) pair
//!    suppresses duplicate alerts; set only after a successful send
//! 4. **Isolated failures** - One endpoint's evaluation error is logged
//!    and counted without touching its siblings in the same sweep
//!
//! ## Message Flow
//!
//! ```text
//! Sweep timer → active monitors → window per endpoint → breach?
//!     ↑                                                    │
//!     └─── Commands (CheckNow, Shutdown)        email → Alert record → cooldown
//! ```

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, trace, warn};

use crate::cache::{CacheStore, cooldown_key};
use crate::config::AlertingConfig;
use crate::email::{EmailMessage, EmailSender};
use crate::repo::Repository;
use crate::util::format_elapsed;
use crate::{AlertStatus, AlertType, Endpoint, ProbeLog, ProbeStatus};

use super::messages::{AlertSweepSummary, AlertingCommand};

/// Verdict over one endpoint's recent window
#[derive(Debug, Clone, PartialEq)]
pub enum WindowVerdict {
    /// Too few logs to judge the endpoint at all
    Insufficient { total: usize },

    /// Below the problematic threshold
    Healthy { problematic_pct: f64 },

    /// At or above the threshold
    Breach(Breach),
}

/// An over-threshold window, ready to become an alert
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub alert_type: AlertType,
    pub predominant: ProbeStatus,
    pub problematic_pct: f64,
    pub problematic: usize,
    pub total: usize,

    /// Timestamp of the oldest log in the window; its age is the
    /// incident duration shown to the user
    pub oldest: DateTime<Utc>,
}

/// Judge a window of logs ordered newest-first
pub fn evaluate_window(logs: &[ProbeLog], min_logs: usize, threshold_pct: f64) -> WindowVerdict {
    let total = logs.len();
    if total < min_logs || total == 0 {
        return WindowVerdict::Insufficient { total };
    }

    let problematic = logs.iter().filter(|log| log.status.is_problematic()).count();
    let problematic_pct = problematic as f64 / total as f64 * 100.0;
    if problematic_pct < threshold_pct {
        return WindowVerdict::Healthy { problematic_pct };
    }

    let down = logs
        .iter()
        .filter(|log| log.status == ProbeStatus::Down)
        .count();
    let degraded = problematic - down;

    // DOWN must strictly beat DEGRADED to be called a downtime
    let (predominant, alert_type) = if down > degraded {
        (ProbeStatus::Down, AlertType::Downtime)
    } else {
        (ProbeStatus::Degraded, AlertType::Performance)
    };

    // newest-first ordering puts the oldest log last
    let oldest = logs[total - 1].timestamp;

    WindowVerdict::Breach(Breach {
        alert_type,
        predominant,
        problematic_pct,
        problematic,
        total,
        oldest,
    })
}

/// How one endpoint's check ended
enum CheckOutcome {
    Healthy,
    Skipped,
    Suppressed,
    Alerted,
}

/// Service that turns problematic probe windows into user alerts
pub struct AlertingService {
    /// Cadence, window and thresholds
    config: AlertingConfig,

    /// Source of monitors and logs, sink of alert records
    repo: Arc<dyn Repository>,

    /// Holds the cooldown flags
    cache: Arc<dyn CacheStore>,

    /// Delivers the alert emails
    mailer: Arc<dyn EmailSender>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<AlertingCommand>,
}

impl AlertingService {
    pub fn new(
        config: AlertingConfig,
        repo: Arc<dyn Repository>,
        cache: Arc<dyn CacheStore>,
        mailer: Arc<dyn EmailSender>,
        command_rx: mpsc::Receiver<AlertingCommand>,
    ) -> Self {
        Self {
            config,
            repo,
            cache,
            mailer,
            command_rx,
        }
    }

    /// Run the service's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alerting service");

        let mut sweep_ticker = interval(self.config.sweep_interval);
        sweep_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // Sweep timer - evaluate the whole fleet
                _ = sweep_ticker.tick() => {
                    match self.sweep().await {
                        Ok(summary) => {
                            if summary.alerted > 0 || summary.failed > 0 {
                                debug!(
                                    "sweep alerted {} and failed {} of {} endpoints",
                                    summary.alerted, summary.failed, summary.checked
                                );
                            }
                        }
                        Err(e) => error!("alert sweep failed: {:#}", e),
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        AlertingCommand::CheckNow { respond_to } => {
                            debug!("received CheckNow command");
                            let result = self.sweep().await;
                            let _ = respond_to.send(result);
                        }

                        AlertingCommand::Shutdown => {
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

        debug!("alerting service stopped");
    }

    /// Evaluate every endpoint reachable from an active monitor
    #[instrument(skip(self))]
    async fn sweep(&self) -> Result<AlertSweepSummary> {
        let monitors = self.repo.list_active_monitors().await?;

        let items: Vec<(String, String, Endpoint)> = monitors
            .into_iter()
            .flat_map(|monitor| {
                let user_id = monitor.user_id;
                let user_email = monitor.user_email;
                monitor.endpoints.into_iter().map(move |endpoint| {
                    (user_id.clone(), user_email.clone(), endpoint)
                })
            })
            .collect();

        let mut summary = AlertSweepSummary {
            checked: items.len(),
            ..AlertSweepSummary::default()
        };

        for batch in items.chunks(self.config.sweep_batch.max(1)) {
            let checks = batch
                .iter()
                .map(|(user_id, email, endpoint)| self.check_endpoint(user_id, email, endpoint));

            for ((_, _, endpoint), result) in batch.iter().zip(join_all(checks).await) {
                match result {
                    Ok(CheckOutcome::Healthy) => {}
                    Ok(CheckOutcome::Skipped) => summary.skipped += 1,
                    Ok(CheckOutcome::Suppressed) => summary.suppressed += 1,
                    Ok(CheckOutcome::Alerted) => summary.alerted += 1,
                    Err(e) => {
                        // one endpoint's failure never touches its siblings
                        error!("alert check failed for {}: {:#}", endpoint.id, e);
                        summary.failed += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Evaluate one endpoint's window and alert if warranted
    ///
    /// Ordering is deliberate: the email goes out first, the alert is
    /// recorded second, and the cooldown flag is set last. A failed
    /// send records a FAILED alert and leaves no cooldown, so the next
    /// sweep tries again.
    async fn check_endpoint(
        &self,
        user_id: &str,
        user_email: &str,
        endpoint: &Endpoint,
    ) -> Result<CheckOutcome> {
        let now = Utc::now();
        let since = now - chrono::Duration::from_std(self.config.window)?;
        let logs = self.repo.logs_since(&endpoint.id, since).await?;

        let verdict = evaluate_window(&logs, self.config.min_logs, self.config.threshold_pct);
        let breach = match verdict {
            WindowVerdict::Insufficient { total } => {
                trace!("{}: only {total} logs in window, skipping", endpoint.id);
                return Ok(CheckOutcome::Skipped);
            }
            WindowVerdict::Healthy { .. } => return Ok(CheckOutcome::Healthy),
            WindowVerdict::Breach(breach) => breach,
        };

        let flag = cooldown_key(user_id, &endpoint.id);
        if self.cache.get(&flag).await?.is_some() {
            debug!("alert for {} suppressed by cooldown", endpoint.id);
            return Ok(CheckOutcome::Suppressed);
        }

        let message = format!(
            "Website {} has been {} for {}",
            endpoint.url,
            breach.predominant,
            format_elapsed(breach.oldest, now)
        );
        warn!(
            "{}: {:.0}% of {} logs problematic, alerting {user_email}",
            endpoint.id, breach.problematic_pct, breach.total
        );

        let email = self.compose_email(user_email, endpoint, &breach, &message);
        if let Err(e) = self.mailer.send(&email).await {
            self.repo
                .append_alert(&endpoint.id, breach.alert_type, AlertStatus::Failed, &message)
                .await?;
            return Err(anyhow::Error::new(e).context("alert email failed"));
        }

        self.repo
            .append_alert(&endpoint.id, breach.alert_type, AlertStatus::Sent, &message)
            .await?;
        self.cache
            .set_with_expiry(&flag, "1", self.config.cooldown_ttl)
            .await?;

        Ok(CheckOutcome::Alerted)
    }

    fn compose_email(
        &self,
        to: &str,
        endpoint: &Endpoint,
        breach: &Breach,
        headline: &str,
    ) -> EmailMessage {
        let window_minutes = self.config.window.as_secs() / 60;
        EmailMessage {
            to: to.to_string(),
            subject: format!(
                "Website alert: {} is {}",
                endpoint.url, breach.predominant
            ),
            body: format!(
                "{headline}.\n\n\
                 {} of the last {} checks over the past {window_minutes} minutes \
                 were problematic.\n\n\
                 You will not receive another alert for this website while the \
                 cooldown is active.",
                breach.problematic, breach.total
            ),
        }
    }
}

/// Handle for controlling an AlertingService
#[derive(Clone)]
pub struct AlertingHandle {
    sender: mpsc::Sender<AlertingCommand>,
}

impl AlertingHandle {
    /// Spawn an alerting service over the given capabilities
    pub fn spawn(
        config: AlertingConfig,
        repo: Arc<dyn Repository>,
        cache: Arc<dyn CacheStore>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let service = AlertingService::new(config, repo, cache, mailer, cmd_rx);

        tokio::spawn(service.run());

        Self { sender: cmd_tx }
    }

    /// Run one sweep immediately
    pub async fn check_now(&self) -> Result<AlertSweepSummary> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertingCommand::CheckNow { respond_to: tx })
            .await?;

        rx.await?
    }

    /// Shut down the alerting engine
    pub async fn shutdown(self) {
        let _ = self.sender.send(AlertingCommand::Shutdown).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

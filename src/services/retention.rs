//! RetentionService - time-based pruning of historical data
//!
//! Runs a daily pass that deletes probe logs and analytics rollups
//! older than their configured horizons. Rollups outlive the raw logs
//! they were computed from, so the two horizons are independent.
//!
//! ## Message Flow
//!
//! ```text
//! Prune timer → cutoffs from horizons → repository deletes
//!     ↑
//!     └─── Commands (PruneNow, Shutdown)
//! ```

use std::sync::Arc;

use anyhow::Result;
use chrono::{Months, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, warn};

use crate::config::RetentionConfig;
use crate::repo::Repository;

use super::messages::{PruneSummary, RetentionCommand};

/// Service that enforces the data retention horizons
pub struct RetentionService {
    /// Cadence and horizon lengths
    config: RetentionConfig,

    /// Store holding the logs and rollups to prune
    repo: Arc<dyn Repository>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<RetentionCommand>,
}

impl RetentionService {
    pub fn new(
        config: RetentionConfig,
        repo: Arc<dyn Repository>,
        command_rx: mpsc::Receiver<RetentionCommand>,
    ) -> Self {
        Self {
            config,
            repo,
            command_rx,
        }
    }

    /// Run the service's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting retention service");

        let mut prune_ticker = interval(self.config.prune_interval);
        prune_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // Prune timer - enforce both horizons
                _ = prune_ticker.tick() => {
                    match self.prune().await {
                        Ok(summary) => {
                            if summary.logs_removed > 0 || summary.rollups_removed > 0 {
                                debug!(
                                    "pruned {} logs and {} rollups",
                                    summary.logs_removed, summary.rollups_removed
                                );
                            }
                        }
                        Err(e) => error!("retention pass failed: {:#}", e),
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RetentionCommand::PruneNow { respond_to } => {
                            debug!("received PruneNow command");
                            let result = self.prune().await;
                            let _ = respond_to.send(result);
                        }

                        RetentionCommand::Shutdown => {
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

        debug!("retention service stopped");
    }

    /// Delete rows older than the configured horizons
    async fn prune(&self) -> Result<PruneSummary> {
        let now = Utc::now();
        let log_cutoff = now - Months::new(self.config.log_horizon_months);
        let rollup_cutoff = now - Months::new(self.config.rollup_horizon_months);

        let logs_removed = self.repo.prune_logs(log_cutoff).await?;
        let rollups_removed = self.repo.prune_rollups(rollup_cutoff).await?;

        Ok(PruneSummary {
            logs_removed,
            rollups_removed,
        })
    }
}

/// Handle for controlling a RetentionService
#[derive(Clone)]
pub struct RetentionHandle {
    sender: mpsc::Sender<RetentionCommand>,
}

impl RetentionHandle {
    /// Spawn a retention service over the given repository
    pub fn spawn(config: RetentionConfig, repo: Arc<dyn Repository>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let service = RetentionService::new(config, repo, cmd_rx);

        tokio::spawn(service.run());

        Self { sender: cmd_tx }
    }

    /// Run one prune pass immediately
    pub async fn prune_now(&self) -> Result<PruneSummary> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetentionCommand::PruneNow { respond_to: tx })
            .await?;

        rx.await?
    }

    /// Shut down the retention service
    pub async fn shutdown(self) {
        let _ = self.sender.send(RetentionCommand::Shutdown).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

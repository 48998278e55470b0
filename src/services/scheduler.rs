//! SchedulerService - fleet refresh and probe dispatch
//!
//! This service decides what to probe and when, at fleet scale.
//!
//! ## Key Features
//!
//! 1. **Cache-backed fleet snapshot** - The active fleet is serialized to the
//!    cache store on a coarse timer; dispatch only ever reads the snapshot,
//!    never the persistent store directly
//! 2. **Dynamic batch sizing** - Enqueues are partitioned into batches sized
//!    as a step function of fleet size
//! 3. **Stale-cache fallback** - A failed refresh degrades to the existing
//!    snapshot instead of halting dispatch
//! 4. **Transparent repair** - A dispatch tick that finds no snapshot runs an
//!    on-demand refresh before proceeding
//!
//! ## Message Flow
//!
//! ```text
//! Refresh timer → Persistent Store → FleetSnapshot (cache, TTL = refresh period)
//! Dispatch timer → FleetSnapshot → batched enqueues → Job Queue
//!     ↑
//!     └─── Commands (RefreshNow, DispatchNow, GetHealth, Shutdown)
//! ```

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, trace, warn};

use crate::cache::{CacheStore, FLEET_SNAPSHOT_KEY};
use crate::config::SchedulerConfig;
use crate::queue::{EnqueueOptions, JobQueue, PROBE_JOB_KIND};
use crate::repo::Repository;
use crate::util::with_timeout;
use crate::{FleetEndpoint, ProbeJob};

use super::messages::{DispatchSummary, SchedulerCommand, SchedulerHealth};

/// Batch size as a step function of fleet size
///
/// Small fleets keep batches small so one tick's enqueues stay cheap;
/// very large fleets use large batches so a tick still finishes inside
/// the dispatch interval.
pub fn dynamic_batch_size(fleet_size: usize) -> usize {
    if fleet_size < 500 {
        50
    } else if fleet_size > 5000 {
        500
    } else {
        100
    }
}

/// Service that maintains the fleet snapshot and dispatches probe jobs
pub struct SchedulerService {
    /// Timing and cache policy
    config: SchedulerConfig,

    /// Source of truth for the fleet
    repo: Arc<dyn Repository>,

    /// Holds the fleet snapshot
    cache: Arc<dyn CacheStore>,

    /// Receives the dispatched probe jobs
    queue: Arc<dyn JobQueue>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<SchedulerCommand>,

    /// When the snapshot was last written by this process
    last_refresh: Option<DateTime<Utc>>,

    /// Most recent refresh error
    last_error: Option<String>,

    /// False only after a refresh failed with no snapshot to fall back on
    healthy: bool,
}

impl SchedulerService {
    pub fn new(
        config: SchedulerConfig,
        repo: Arc<dyn Repository>,
        cache: Arc<dyn CacheStore>,
        queue: Arc<dyn JobQueue>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        Self {
            config,
            repo,
            cache,
            queue,
            command_rx,
            last_refresh: None,
            last_error: None,
            healthy: true,
        }
    }

    /// Run the service's main loop
    ///
    /// Both timers fire once immediately, so spawning the scheduler warms
    /// the snapshot and dispatches a first wave without waiting a full
    /// period. Runs until a Shutdown command arrives or the command
    /// channel closes.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting scheduler service");

        let mut refresh_ticker = interval(self.config.refresh_interval);
        let mut dispatch_ticker = interval(self.config.dispatch_interval);
        // a delayed tick runs once instead of bursting to catch up
        refresh_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        dispatch_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // Coarse timer - rebuild the fleet snapshot
                _ = refresh_ticker.tick() => {
                    if let Err(e) = self.refresh_fleet().await {
                        error!("fleet refresh failed: {:#}", e);
                    }
                }

                // Fine timer - dispatch probe jobs from the snapshot
                _ = dispatch_ticker.tick() => {
                    match self.dispatch().await {
                        Ok(summary) => {
                            trace!(
                                "dispatch tick enqueued {} of {} endpoints",
                                summary.enqueued, summary.fleet_size
                            );
                        }
                        Err(e) => error!("dispatch tick failed: {:#}", e),
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::RefreshNow { respond_to } => {
                            debug!("received RefreshNow command");
                            let result = self.refresh_fleet().await;
                            let _ = respond_to.send(result);
                        }

                        SchedulerCommand::DispatchNow { respond_to } => {
                            debug!("received DispatchNow command");
                            let result = self.dispatch().await;
                            let _ = respond_to.send(result);
                        }

                        SchedulerCommand::GetHealth { respond_to } => {
                            let _ = respond_to.send(SchedulerHealth {
                                healthy: self.healthy,
                                last_refresh: self.last_refresh,
                                last_error: self.last_error.clone(),
                            });
                        }

                        SchedulerCommand::Shutdown => {
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

        debug!("scheduler service stopped");
    }

    /// Rebuild the fleet snapshot from the persistent store
    ///
    /// The snapshot TTL equals the refresh period, so a snapshot is only
    /// ever absent when refreshes have been failing for a full period.
    #[instrument(skip(self))]
    async fn refresh_fleet(&mut self) -> Result<()> {
        let fleet = match with_timeout(
            self.config.op_timeout,
            "fleet query",
            self.repo.list_fleet_endpoints(),
        )
        .await
        {
            Ok(fleet) => fleet,
            Err(e) => return self.degrade_refresh(e).await,
        };

        let payload = match serde_json::to_string(&fleet) {
            Ok(payload) => payload,
            Err(e) => return self.degrade_refresh(anyhow::Error::new(e)).await,
        };

        if let Err(e) = with_timeout(
            self.config.op_timeout,
            "snapshot write",
            self.cache
                .set_with_expiry(FLEET_SNAPSHOT_KEY, &payload, self.config.refresh_interval),
        )
        .await
        {
            return self.degrade_refresh(e).await;
        }

        self.last_refresh = Some(Utc::now());
        self.last_error = None;
        self.healthy = true;
        debug!("fleet snapshot refreshed with {} endpoints", fleet.len());
        Ok(())
    }

    /// Decide whether a refresh failure is survivable
    ///
    /// Stale-but-present beats no data: with an unexpired snapshot still
    /// cached the failure is logged and swallowed. With nothing cached it
    /// is surfaced and the scheduler reports unhealthy.
    async fn degrade_refresh(&mut self, error: anyhow::Error) -> Result<()> {
        self.last_error = Some(format!("{error:#}"));

        let existing = with_timeout(
            self.config.op_timeout,
            "snapshot read",
            self.cache.get(FLEET_SNAPSHOT_KEY),
        )
        .await
        .ok()
        .flatten();

        if existing.is_some() {
            warn!("fleet refresh failed, serving stale snapshot: {:#}", error);
            return Ok(());
        }

        self.healthy = false;
        Err(error.context("fleet refresh failed with no snapshot to fall back on"))
    }

    /// Run one dispatch tick
    ///
    /// Loads the snapshot (repairing it if needed) and enqueues one probe
    /// job per endpoint, in sequential batches whose enqueues are issued
    /// concurrently. A single failed enqueue is logged and skipped.
    #[instrument(skip(self))]
    async fn dispatch(&mut self) -> Result<DispatchSummary> {
        let fleet = self.cached_fleet().await?;
        let batch_size = dynamic_batch_size(fleet.len());
        let mut summary = DispatchSummary {
            fleet_size: fleet.len(),
            batch_size,
            enqueued: 0,
            skipped: 0,
        };

        if fleet.is_empty() {
            trace!("dispatch tick with empty fleet");
            return Ok(summary);
        }

        let started = std::time::Instant::now();
        for batch in fleet.chunks(batch_size) {
            let enqueues = batch.iter().map(|endpoint| {
                let job = ProbeJob {
                    endpoint_id: endpoint.id.clone(),
                    url: endpoint.url.clone(),
                    timeout_ms: None,
                };
                with_timeout(
                    self.config.op_timeout,
                    "probe enqueue",
                    self.queue.enqueue(PROBE_JOB_KIND, job, EnqueueOptions::default()),
                )
            });

            for (endpoint, result) in batch.iter().zip(join_all(enqueues).await) {
                match result {
                    Ok(_) => summary.enqueued += 1,
                    Err(e) => {
                        warn!("failed to enqueue probe for {}: {:#}", endpoint.id, e);
                        summary.skipped += 1;
                    }
                }
            }
        }

        debug!(
            "dispatched {} probes in batches of {batch_size} in {:?}",
            summary.enqueued,
            started.elapsed()
        );
        Ok(summary)
    }

    /// Fetch the snapshot, transparently repairing an absent or expired one
    async fn cached_fleet(&mut self) -> Result<Vec<FleetEndpoint>> {
        let cached = with_timeout(
            self.config.op_timeout,
            "snapshot read",
            self.cache.get(FLEET_SNAPSHOT_KEY),
        )
        .await?;

        let raw = match cached {
            Some(raw) => raw,
            None => {
                debug!("fleet snapshot missing, repairing via on-demand refresh");
                self.refresh_fleet().await?;
                with_timeout(
                    self.config.op_timeout,
                    "snapshot read",
                    self.cache.get(FLEET_SNAPSHOT_KEY),
                )
                .await?
                .ok_or_else(|| anyhow!("fleet snapshot still missing after repair"))?
            }
        };

        serde_json::from_str(&raw).context("failed to deserialize fleet snapshot")
    }
}

/// Handle for controlling a SchedulerService
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn a scheduler service over the given capabilities
    pub fn spawn(
        config: SchedulerConfig,
        repo: Arc<dyn Repository>,
        cache: Arc<dyn CacheStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let service = SchedulerService::new(config, repo, cache, queue, cmd_rx);

        tokio::spawn(service.run());

        Self { sender: cmd_tx }
    }

    /// Refresh the fleet snapshot immediately
    pub async fn refresh_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::RefreshNow { respond_to: tx })
            .await?;

        rx.await??;
        Ok(())
    }

    /// Run one dispatch tick immediately
    pub async fn dispatch_now(&self) -> Result<DispatchSummary> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::DispatchNow { respond_to: tx })
            .await?;

        rx.await?
    }

    /// Get the scheduler's current health
    pub async fn health(&self) -> Result<SchedulerHealth> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::GetHealth { respond_to: tx })
            .await?;

        Ok(rx.await?)
    }

    /// Shut down the scheduler
    pub async fn shutdown(self) {
        let _ = self.sender.send(SchedulerCommand::Shutdown).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::queue::MemoryQueue;
    use crate::repo::MemoryRepository;

    async fn seeded_repo(endpoints: usize) -> Arc<MemoryRepository> {
        let repo = MemoryRepository::new();
        let user = repo.seed_user("owner@example.com").await;
        let monitor = repo.seed_monitor(&user, true).await;
        for i in 0..endpoints {
            repo.seed_endpoint(&monitor, &format!("https://site-{i}.test")).await;
        }
        Arc::new(repo)
    }

    fn service(
        repo: Arc<MemoryRepository>,
        cache: Arc<MemoryCache>,
        queue: Arc<MemoryQueue>,
    ) -> SchedulerService {
        let (_tx, rx) = mpsc::channel(1);
        SchedulerService::new(SchedulerConfig::default(), repo, cache, queue, rx)
    }

    #[test]
    fn test_batch_size_step_function_is_boundary_exact() {
        assert_eq!(dynamic_batch_size(0), 50);
        assert_eq!(dynamic_batch_size(1), 50);
        assert_eq!(dynamic_batch_size(499), 50);
        assert_eq!(dynamic_batch_size(500), 100);
        assert_eq!(dynamic_batch_size(5000), 100);
        assert_eq!(dynamic_batch_size(5001), 500);
        assert_eq!(dynamic_batch_size(20_000), 500);
    }

    #[tokio::test]
    async fn test_refresh_writes_snapshot() {
        let repo = seeded_repo(2).await;
        let cache = Arc::new(MemoryCache::default());
        let queue = Arc::new(MemoryQueue::new());
        let mut scheduler = service(repo, cache.clone(), queue);

        scheduler.refresh_fleet().await.unwrap();

        let raw = cache.get(FLEET_SNAPSHOT_KEY).await.unwrap().unwrap();
        let snapshot: Vec<FleetEndpoint> = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|ep| ep.monitor_active));
        assert!(scheduler.healthy);
        assert!(scheduler.last_refresh.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_enqueues_one_job_per_endpoint() {
        let repo = seeded_repo(3).await;
        let cache = Arc::new(MemoryCache::default());
        let queue = Arc::new(MemoryQueue::new());
        let mut scheduler = service(repo, cache, queue.clone());

        scheduler.refresh_fleet().await.unwrap();
        let summary = scheduler.dispatch().await.unwrap();

        assert_eq!(summary.fleet_size, 3);
        assert_eq!(summary.batch_size, 50);
        assert_eq!(summary.enqueued, 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(queue.stats().await.unwrap().ready, 3);
    }

    #[tokio::test]
    async fn test_dispatch_repairs_missing_snapshot() {
        let repo = seeded_repo(2).await;
        let cache = Arc::new(MemoryCache::default());
        let queue = Arc::new(MemoryQueue::new());
        let mut scheduler = service(repo, cache.clone(), queue);

        // no refresh has ever run
        let summary = scheduler.dispatch().await.unwrap();

        assert_eq!(summary.enqueued, 2);
        assert!(cache.get(FLEET_SNAPSHOT_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dispatch_reads_the_snapshot_not_the_store() {
        let repo = seeded_repo(2).await;
        let cache = Arc::new(MemoryCache::default());
        let queue = Arc::new(MemoryQueue::new());
        let mut scheduler = service(repo.clone(), cache, queue);

        scheduler.refresh_fleet().await.unwrap();

        // fleet grows after the snapshot was taken
        let user = repo.seed_user("late@example.com").await;
        let monitor = repo.seed_monitor(&user, true).await;
        repo.seed_endpoint(&monitor, "https://late.test").await;

        let stale = scheduler.dispatch().await.unwrap();
        assert_eq!(stale.fleet_size, 2);

        scheduler.refresh_fleet().await.unwrap();
        let fresh = scheduler.dispatch().await.unwrap();
        assert_eq!(fresh.fleet_size, 3);
    }

    #[tokio::test]
    async fn test_dispatch_with_empty_fleet_is_a_noop() {
        let repo = Arc::new(MemoryRepository::new());
        let cache = Arc::new(MemoryCache::default());
        let queue = Arc::new(MemoryQueue::new());
        let mut scheduler = service(repo, cache, queue.clone());

        let summary = scheduler.dispatch().await.unwrap();

        assert_eq!(summary.fleet_size, 0);
        assert_eq!(summary.enqueued, 0);
        assert_eq!(queue.stats().await.unwrap().ready, 0);
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let repo = seeded_repo(1).await;
        let cache = Arc::new(MemoryCache::default());
        let queue = Arc::new(MemoryQueue::new());
        let handle =
            SchedulerHandle::spawn(SchedulerConfig::default(), repo, cache, queue);

        handle.refresh_now().await.unwrap();
        let health = handle.health().await.unwrap();
        assert!(health.healthy);
        assert!(health.last_refresh.is_some());

        let summary = handle.dispatch_now().await.unwrap();
        assert_eq!(summary.fleet_size, 1);

        handle.shutdown().await;
    }
}

//! WorkerService - the monitoring worker pool
//!
//! Pulls probe jobs off the queue and executes them with bounded
//! concurrency, recording exactly one probe log per delivery.
//!
//! ## Key Features
//!
//! 1. **Bounded concurrency** - A semaphore caps the number of probes in
//!    flight at once
//! 2. **Rate-limited starts** - A fixed window bounds how many jobs may
//!    start per interval, independent of concurrency
//! 3. **Lease renewal** - Long-running probes renew their queue lease at
//!    half the lease period so they are not presumed stalled
//! 4. **One log per delivery** - The delivery is acked only after the log
//!    write lands; a failed write nacks the job into the queue's backoff
//! 5. **Drain-then-force shutdown** - In-flight probes get a bounded grace
//!    period, then the rest are abandoned
//!
//! ## Message Flow
//!
//! ```text
//! Claim timer → JobQueue.claim → [probe task × concurrency] → ProbeLog → ack
//!                                          │ (write failed)
//!     ↑                                    └──→ nack (queue backoff)
//!     └─── Commands (GetStats, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, timeout_at};
use tracing::{debug, error, instrument, trace, warn};

use crate::config::WorkerConfig;
use crate::probe::{PROBE_USER_AGENT, execute_probe};
use crate::queue::{Delivery, JobId, JobQueue};
use crate::repo::Repository;
use crate::util::with_timeout;

use super::messages::{WorkerCommand, WorkerStats};

/// Fixed-window rate limiter for job starts
///
/// Grants up to `max` tokens per window. A token taken for a claim that
/// comes back empty is released again, so idle polling never eats into
/// the budget of real work.
struct RateLimiter {
    max: u32,
    window: Duration,
    window_start: Instant,
    taken: u32,
}

impl RateLimiter {
    fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            window_start: Instant::now(),
            taken: 0,
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.taken = 0;
        }

        if self.taken < self.max {
            self.taken += 1;
            true
        } else {
            false
        }
    }

    fn release(&mut self) {
        self.taken = self.taken.saturating_sub(1);
    }
}

/// How one delivery ended, for the worker's counters
enum TaskOutcome {
    Succeeded,
    Failed,
}

/// The state a probe task carries into its spawned future
struct ProbeTask {
    queue: Arc<dyn JobQueue>,
    repo: Arc<dyn Repository>,
    client: reqwest::Client,
    config: WorkerConfig,
}

impl ProbeTask {
    /// Execute one delivery end to end
    ///
    /// The lease is renewed in a side task while the probe runs. After
    /// classification exactly one log write is attempted: on success the
    /// delivery is acked, on failure it is nacked so the queue's own
    /// retry/backoff takes over.
    async fn run(self, permit: OwnedSemaphorePermit, delivery: Delivery) -> TaskOutcome {
        // held until this task finishes, releasing the concurrency slot
        let _permit = permit;

        let renewal = tokio::spawn(Self::renew_lease_loop(
            self.queue.clone(),
            delivery.id,
            self.config.lease,
            self.config.renew_interval,
        ));

        let outcome = execute_probe(
            &self.client,
            &delivery.payload,
            self.config.retry,
            self.config.threshold_ms,
            self.config.probe_timeout,
        )
        .await;

        renewal.abort();

        let write = with_timeout(
            self.config.write_timeout,
            "probe log write",
            self.repo.append_probe_log(
                &delivery.payload.endpoint_id,
                outcome.status,
                outcome.response_time_ms,
            ),
        )
        .await;

        match write {
            Ok(()) => {
                trace!(
                    "probe for {} recorded as {}",
                    delivery.payload.endpoint_id, outcome.status
                );
                if let Err(e) = self.queue.ack(delivery.id).await {
                    warn!("failed to ack job {}: {}", delivery.id, e);
                    return TaskOutcome::Failed;
                }
                TaskOutcome::Succeeded
            }
            Err(e) => {
                error!(
                    "probe log write failed for {}: {:#}",
                    delivery.payload.endpoint_id, e
                );
                if let Err(nack_err) = self.queue.nack(delivery.id, &format!("{e:#}")).await {
                    warn!("failed to nack job {}: {}", delivery.id, nack_err);
                }
                TaskOutcome::Failed
            }
        }
    }

    async fn renew_lease_loop(
        queue: Arc<dyn JobQueue>,
        id: JobId,
        lease: Duration,
        every: Duration,
    ) {
        loop {
            sleep(every).await;
            if let Err(e) = queue.renew_lease(id, lease).await {
                warn!("lease renewal for job {id} failed: {}", e);
                break;
            }
            trace!("renewed lease for job {id}");
        }
    }
}

/// Service that executes probe jobs from the queue
pub struct WorkerService {
    /// Pool sizing, rate limiting and lease policy
    config: WorkerConfig,

    /// Where probe logs are written
    repo: Arc<dyn Repository>,

    /// Source of deliveries
    queue: Arc<dyn JobQueue>,

    /// HTTP client (reused across probes for connection pooling)
    client: reqwest::Client,

    /// Concurrency gate; one permit per in-flight probe
    permits: Arc<Semaphore>,

    /// Bounds job starts per window
    limiter: RateLimiter,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<WorkerCommand>,

    /// Lifetime counters (`in_flight` is filled in at read time)
    stats: WorkerStats,
}

impl WorkerService {
    pub fn new(
        config: WorkerConfig,
        repo: Arc<dyn Repository>,
        queue: Arc<dyn JobQueue>,
        command_rx: mpsc::Receiver<WorkerCommand>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency));
        let limiter = RateLimiter::new(config.rate_limit_max, config.rate_limit_window);

        Self {
            client: reqwest::Client::builder()
                .user_agent(PROBE_USER_AGENT)
                .build()
                .expect("Failed to build HTTP client"),
            config,
            repo,
            queue,
            permits,
            limiter,
            command_rx,
            stats: WorkerStats::default(),
        }
    }

    /// Run the worker's main loop
    ///
    /// Runs until a Shutdown command arrives or the command channel
    /// closes; both paths drain in-flight probes first.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting worker service (concurrency {}, {} starts per {:?})",
            self.config.concurrency, self.config.rate_limit_max, self.config.rate_limit_window
        );

        let mut claim_ticker = interval(self.config.poll_interval);
        claim_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                // Claim timer - pull as much work as the gates allow
                _ = claim_ticker.tick() => {
                    self.claim_available(&mut tasks).await;
                }

                // Reap finished probe tasks
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    self.record_outcome(result);
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        WorkerCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(WorkerStats {
                                in_flight: tasks.len(),
                                ..self.stats
                            });
                        }

                        WorkerCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            self.drain(&mut tasks).await;
                            let _ = respond_to.send(());
                            break;
                        }
                    }
                }

                // Command channel closed - exit
                else => {
                    warn!("command channel closed, shutting down");
                    self.drain(&mut tasks).await;
                    break;
                }
            }
        }

        debug!("worker service stopped");
    }

    /// Claim ready jobs until a gate refuses or the queue runs dry
    async fn claim_available(&mut self, tasks: &mut JoinSet<TaskOutcome>) {
        loop {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            if !self.limiter.try_take() {
                break;
            }

            let delivery = match self.queue.claim(self.config.lease).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    self.limiter.release();
                    break;
                }
                Err(e) => {
                    self.limiter.release();
                    warn!("claim failed: {}", e);
                    break;
                }
            };

            trace!(
                "claimed job {} for {} (attempt {})",
                delivery.id, delivery.payload.endpoint_id, delivery.attempt
            );
            self.stats.processed += 1;

            let task = ProbeTask {
                queue: self.queue.clone(),
                repo: self.repo.clone(),
                client: self.client.clone(),
                config: self.config.clone(),
            };
            tasks.spawn(task.run(permit, delivery));
        }
    }

    fn record_outcome(&mut self, result: Result<TaskOutcome, tokio::task::JoinError>) {
        match result {
            Ok(TaskOutcome::Succeeded) => self.stats.succeeded += 1,
            Ok(TaskOutcome::Failed) => self.stats.failed += 1,
            Err(e) => {
                if !e.is_cancelled() {
                    error!("probe task panicked: {}", e);
                }
                self.stats.failed += 1;
            }
        }
    }

    /// Let in-flight probes finish within the grace period, abandon the rest
    async fn drain(&mut self, tasks: &mut JoinSet<TaskOutcome>) {
        if tasks.is_empty() {
            return;
        }

        debug!("draining {} in-flight probes", tasks.len());
        let deadline = Instant::now() + self.config.shutdown_grace;

        while !tasks.is_empty() {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(result)) => self.record_outcome(result),
                Ok(None) => break,
                Err(_) => {
                    warn!("shutdown grace elapsed, abandoning {} probes", tasks.len());
                    tasks.abort_all();
                    break;
                }
            }
        }
    }
}

/// Handle for controlling a WorkerService
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::Sender<WorkerCommand>,
}

impl WorkerHandle {
    /// Spawn a worker service over the given capabilities
    pub fn spawn(
        config: WorkerConfig,
        repo: Arc<dyn Repository>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let service = WorkerService::new(config, repo, queue, cmd_rx);

        tokio::spawn(service.run());

        Self { sender: cmd_tx }
    }

    /// Get processing counters
    pub async fn stats(&self) -> Result<WorkerStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WorkerCommand::GetStats { respond_to: tx })
            .await?;

        Ok(rx.await?)
    }

    /// Drain and stop the worker; returns once it has stopped
    pub async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(WorkerCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! In-memory job queue (no persistence)
//!
//! Implements the full lease/retry state machine over plain collections.
//! Deadlines are `tokio::time::Instant`s, so lease expiry and backoff delays
//! are testable under a paused clock.
//!
//! Expired leases are reclaimed lazily at the next `claim`, which is also
//! where delayed jobs get promoted. There is no background janitor task.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::ProbeJob;

use super::error::{QueueError, QueueResult};
use super::queue::{Delivery, EnqueueOptions, FailedJob, JobId, JobQueue, QueueStats};

/// Default stall budget: a job may be redelivered this many times after
/// lease expiry before it is abandoned.
const DEFAULT_MAX_STALLED_REDELIVERIES: u32 = 3;

struct JobEntry {
    kind: String,
    payload: ProbeJob,
    opts: EnqueueOptions,
    attempts_made: u32,
    stalled_count: u32,
    last_error: Option<String>,
}

#[derive(Default)]
struct QueueState {
    next_id: JobId,
    jobs: HashMap<JobId, JobEntry>,
    ready: VecDeque<JobId>,
    delayed: Vec<(Instant, JobId)>,
    in_flight: HashMap<JobId, Instant>,
    failed: Vec<JobId>,
    completed: u64,
}

/// In-memory queue with lease and retry semantics
pub struct MemoryQueue {
    max_stalled_redeliveries: u32,
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_max_stalled_redeliveries(DEFAULT_MAX_STALLED_REDELIVERIES)
    }

    pub fn with_max_stalled_redeliveries(max: u32) -> Self {
        Self {
            max_stalled_redeliveries: max,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Move due delayed jobs back to the ready queue.
    fn promote_due(state: &mut QueueState, now: Instant) {
        let mut still_delayed = Vec::with_capacity(state.delayed.len());

        for (due, id) in state.delayed.drain(..) {
            if due <= now {
                trace!("job {id} backoff elapsed, ready again");
                state.ready.push_back(id);
            } else {
                still_delayed.push((due, id));
            }
        }

        state.delayed = still_delayed;
    }

    /// Reclaim leases that have expired.
    ///
    /// A reclaimed job jumps the ready queue so a stalled delivery is
    /// retried promptly. Once the stall budget is spent the job is
    /// abandoned instead of being redelivered forever.
    fn reclaim_expired(&self, state: &mut QueueState, now: Instant) {
        let expired: Vec<JobId> = state
            .in_flight
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            state.in_flight.remove(&id);

            let Some(entry) = state.jobs.get_mut(&id) else {
                continue;
            };
            entry.stalled_count += 1;

            if entry.stalled_count > self.max_stalled_redeliveries {
                warn!(
                    "job {id} abandoned after {} stalled deliveries",
                    entry.stalled_count
                );
                entry.last_error = Some("lease expired beyond the stall budget".to_string());
                if entry.opts.remove_on_fail {
                    state.jobs.remove(&id);
                } else {
                    state.failed.push(id);
                }
            } else {
                warn!(
                    "job {id} lease expired, redelivering (stall {}/{})",
                    entry.stalled_count, self.max_stalled_redeliveries
                );
                state.ready.push_front(id);
            }
        }
    }

    fn settle_error(state: &QueueState, id: JobId) -> QueueError {
        if state.jobs.contains_key(&id) {
            QueueError::NotInFlight(id)
        } else {
            QueueError::UnknownJob(id)
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(
        &self,
        kind: &str,
        payload: ProbeJob,
        opts: EnqueueOptions,
    ) -> QueueResult<JobId> {
        let mut state = self.state.lock().await;

        state.next_id += 1;
        let id = state.next_id;

        state.jobs.insert(
            id,
            JobEntry {
                kind: kind.to_string(),
                payload,
                opts,
                attempts_made: 0,
                stalled_count: 0,
                last_error: None,
            },
        );
        state.ready.push_back(id);

        trace!("enqueued job {id} ({kind})");
        Ok(id)
    }

    async fn claim(&self, lease: Duration) -> QueueResult<Option<Delivery>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        Self::promote_due(&mut state, now);
        self.reclaim_expired(&mut state, now);

        while let Some(id) = state.ready.pop_front() {
            // ids of purged jobs may linger in the ready queue
            let Some(entry) = state.jobs.get_mut(&id) else {
                continue;
            };

            entry.attempts_made += 1;
            let delivery = Delivery {
                id,
                kind: entry.kind.clone(),
                payload: entry.payload.clone(),
                attempt: entry.attempts_made,
            };

            state.in_flight.insert(id, now + lease);
            debug!("claimed job {id} (attempt {})", delivery.attempt);
            return Ok(Some(delivery));
        }

        Ok(None)
    }

    async fn ack(&self, id: JobId) -> QueueResult<()> {
        let mut state = self.state.lock().await;

        if state.in_flight.remove(&id).is_none() {
            return Err(Self::settle_error(&state, id));
        }

        let remove = state
            .jobs
            .get(&id)
            .is_some_and(|entry| entry.opts.remove_on_complete);
        if remove {
            state.jobs.remove(&id);
        }
        state.completed += 1;

        trace!("job {id} completed");
        Ok(())
    }

    async fn nack(&self, id: JobId, error: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if state.in_flight.remove(&id).is_none() {
            return Err(Self::settle_error(&state, id));
        }

        let Some(entry) = state.jobs.get_mut(&id) else {
            return Err(QueueError::UnknownJob(id));
        };
        entry.last_error = Some(error.to_string());

        if entry.attempts_made >= entry.opts.attempts {
            debug!(
                "job {id} failed after {} attempts: {error}",
                entry.attempts_made
            );
            if entry.opts.remove_on_fail {
                state.jobs.remove(&id);
            } else {
                state.failed.push(id);
            }
        } else {
            let delay = entry.opts.backoff.delay_for(entry.attempts_made);
            debug!(
                "job {id} failed (attempt {}), retrying in {delay:?}: {error}",
                entry.attempts_made
            );
            state.delayed.push((now + delay, id));
        }

        Ok(())
    }

    async fn renew_lease(&self, id: JobId, lease: Duration) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        match state.in_flight.get_mut(&id) {
            Some(deadline) if *deadline > now => {
                *deadline = now + lease;
                trace!("job {id} lease renewed");
                Ok(())
            }
            // an expired lease cannot be revived, even before reclaim
            Some(_) => Err(QueueError::NotInFlight(id)),
            None => Err(Self::settle_error(&state, id)),
        }
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let state = self.state.lock().await;

        Ok(QueueStats {
            ready: state.ready.len(),
            delayed: state.delayed.len(),
            in_flight: state.in_flight.len(),
            failed: state.failed.len(),
            completed: state.completed,
        })
    }

    async fn failed_jobs(&self) -> QueueResult<Vec<FailedJob>> {
        let state = self.state.lock().await;

        Ok(state
            .failed
            .iter()
            .filter_map(|id| {
                state.jobs.get(id).map(|entry| FailedJob {
                    id: *id,
                    kind: entry.kind.clone(),
                    payload: entry.payload.clone(),
                    attempts_made: entry.attempts_made,
                    stalled_count: entry.stalled_count,
                    last_error: entry.last_error.clone(),
                })
            })
            .collect())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

//! Job queue trait definition

use std::time::Duration;

use async_trait::async_trait;

use crate::ProbeJob;

use super::error::QueueResult;

/// Identifier assigned to a job at enqueue time.
pub type JobId = u64;

/// Delay strategy between failed delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay after every failure
    Fixed { delay: Duration },

    /// `base_delay * 2^(n-1)` after the n-th failed attempt
    Exponential { base_delay: Duration },
}

impl Backoff {
    /// Delay before the next delivery, after `attempts_made` failed attempts.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        match self {
            Backoff::Fixed { delay } => *delay,
            Backoff::Exponential { base_delay } => {
                // the shift is capped so pathological attempt counts cannot overflow
                let exp = attempts_made.saturating_sub(1).min(20);
                *base_delay * 2u32.pow(exp)
            }
        }
    }
}

/// Per-job options fixed at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Total deliveries before the job is marked failed.
    ///
    /// A delivery counts against this budget whether it ends in an explicit
    /// nack or in a reclaimed lease.
    pub attempts: u32,

    /// Delay strategy applied on nack
    pub backoff: Backoff,

    /// Purge the job entirely once acknowledged
    pub remove_on_complete: bool,

    /// Purge exhausted jobs instead of retaining them for inspection
    pub remove_on_fail: bool,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::Exponential {
                base_delay: Duration::from_millis(1000),
            },
            remove_on_complete: true,
            remove_on_fail: false,
        }
    }
}

/// One claimed delivery of a job.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: JobId,
    pub kind: String,
    pub payload: ProbeJob,

    /// 1-based delivery number
    pub attempt: u32,
}

/// Counts of jobs per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: usize,
    pub delayed: usize,
    pub in_flight: usize,
    pub failed: usize,
    pub completed: u64,
}

/// A job retained after exhausting its attempts or its stall budget.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub id: JobId,
    pub kind: String,
    pub payload: ProbeJob,
    pub attempts_made: u32,
    pub stalled_count: u32,
    pub last_error: Option<String>,
}

/// Trait for queues with lease and retry semantics
///
/// Any durable queue with visibility-timeout style leases satisfies this
/// contract. The in-memory implementation backs tests and the
/// single-process binary.
///
/// ## Lease model
///
/// `claim` hands out the next ready job together with a lease. The job is
/// invisible to other claims until the lease expires; a live handler extends
/// it with `renew_lease`. A job whose lease expires is presumed stalled and
/// becomes redeliverable, up to the queue's stall budget.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job, returning its id. The job is immediately ready.
    async fn enqueue(&self, kind: &str, payload: ProbeJob, opts: EnqueueOptions)
    -> QueueResult<JobId>;

    /// Claim the next ready job under a lease, `None` when nothing is ready.
    async fn claim(&self, lease: Duration) -> QueueResult<Option<Delivery>>;

    /// Acknowledge a successful delivery.
    async fn ack(&self, id: JobId) -> QueueResult<()>;

    /// Report a failed delivery.
    ///
    /// The job is redelivered after its backoff delay until its attempts are
    /// exhausted, then marked failed.
    async fn nack(&self, id: JobId, error: &str) -> QueueResult<()>;

    /// Extend the lease of an in-flight job.
    ///
    /// Fails with `NotInFlight` once the lease has already expired; the
    /// handler should stop renewing at that point.
    async fn renew_lease(&self, id: JobId, lease: Duration) -> QueueResult<()>;

    async fn stats(&self) -> QueueResult<QueueStats>;

    /// Jobs retained after failure, for inspection.
    async fn failed_jobs(&self) -> QueueResult<Vec<FailedJob>>;

    /// Lightweight liveness probe, called once at service startup.
    async fn ping(&self) -> QueueResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles_per_attempt() {
        let backoff = Backoff::Exponential {
            base_delay: Duration::from_millis(1000),
        };

        assert_eq!(backoff.delay_for(1), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(250),
        };

        assert_eq!(backoff.delay_for(1), Duration::from_millis(250));
        assert_eq!(backoff.delay_for(10), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_backoff_never_overflows() {
        let backoff = Backoff::Exponential {
            base_delay: Duration::from_millis(1000),
        };

        // absurd attempt counts stay finite
        assert!(backoff.delay_for(u32::MAX) > Duration::ZERO);
    }

    #[test]
    fn test_default_enqueue_options_match_dispatch_policy() {
        let opts = EnqueueOptions::default();

        assert_eq!(opts.attempts, 3);
        assert_eq!(
            opts.backoff,
            Backoff::Exponential {
                base_delay: Duration::from_millis(1000)
            }
        );
        assert!(opts.remove_on_complete);
        assert!(!opts.remove_on_fail);
    }
}

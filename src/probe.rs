//! HTTP probe execution and status classification
//!
//! One probe is one HTTP GET against an endpoint's URL. Transport-level
//! flakiness is retried right here in the worker, separately from the
//! job queue's delivery retries. Status codes are never treated as
//! transport failures; whatever the endpoint answers feeds
//! classification instead.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{trace, warn};

use crate::{ProbeJob, ProbeStatus};

/// User agent presented to probed endpoints
pub const PROBE_USER_AGENT: &str = "Website-Monitoring-Service/1.0";

/// Retry policy for transport-level probe failures
///
/// Applies to network errors and 5xx responses only. A 4xx is a
/// definitive answer about the endpoint and is never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Lower bound on every retry delay
    pub min_delay: Duration,

    /// Base of the exponential component, doubled per retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(500),
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry`-th retry (1-based): the exponential
    /// component, floored at `min_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponential = self.base_delay * 2u32.saturating_pow(retry.min(20));
        exponential.max(self.min_delay)
    }

    /// Whether a response status (as opposed to a transport error) is retryable
    pub fn retries_status(status: u16) -> bool {
        (500..600).contains(&status)
    }
}

/// Map a completed HTTP exchange to a probe status
///
/// A 2xx is healthy only when it arrived within the response-time
/// threshold. A 4xx means the endpoint itself rejects the request.
/// Everything else answered, but not in a way that counts as healthy.
pub fn classify(status: u16, elapsed_ms: u64, threshold_ms: u64) -> ProbeStatus {
    match status {
        200..=299 if elapsed_ms <= threshold_ms => ProbeStatus::Up,
        200..=299 => ProbeStatus::Degraded,
        400..=499 => ProbeStatus::Down,
        _ => ProbeStatus::Degraded,
    }
}

/// Result of one probe, after transport retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,

    /// `None` when no attempt produced a response
    pub response_time_ms: Option<u64>,
}

/// Execute one probe job, returning its classified outcome
///
/// Never fails: transport exhaustion is itself a classification (DOWN
/// with no response time), so the caller always has exactly one
/// outcome to record per delivery.
pub async fn execute_probe(
    client: &reqwest::Client,
    job: &ProbeJob,
    policy: RetryPolicy,
    threshold_ms: u64,
    default_timeout: Duration,
) -> ProbeOutcome {
    let timeout = job.timeout_ms.map_or(default_timeout, Duration::from_millis);

    let mut attempt = 1u32;
    loop {
        let start = std::time::Instant::now();

        match client.get(&job.url).timeout(timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // drain the body so the measurement covers the full exchange
                let _ = response.bytes().await;
                let elapsed_ms = start.elapsed().as_millis() as u64;

                if RetryPolicy::retries_status(status) && attempt < policy.max_attempts {
                    trace!("probe got {status} from {}, retrying", job.url);
                } else {
                    return ProbeOutcome {
                        status: classify(status, elapsed_ms, threshold_ms),
                        response_time_ms: Some(elapsed_ms),
                    };
                }
            }
            Err(e) => {
                if attempt >= policy.max_attempts {
                    warn!("probe transport failure for {}: {e}", job.url);
                    return ProbeOutcome {
                        status: ProbeStatus::Down,
                        response_time_ms: None,
                    };
                }
                trace!("probe attempt {attempt} for {} failed: {e}", job.url);
            }
        }

        sleep(policy.delay_for(attempt)).await;
        attempt += 1;
    }
}

//! Job queue between the scheduler and the worker pool
//!
//! The queue is the only handoff mechanism between dispatch and probe
//! execution, and it owns all per-job bookkeeping: retry attempts with
//! backoff, delivery leases, and the stall budget for jobs whose worker
//! disappears mid-flight. Neither side keeps its own coordination state.
//!
//! ## Delivery lifecycle
//!
//! ```text
//! enqueue → ready → claim (lease) → ack                    done
//!             ↑         │
//!             │         ├─ nack ──→ delayed (backoff) ─→ ready   until attempts exhausted → failed
//!             │         └─ lease expires ─→ ready (stall)        until stall budget spent → failed
//!             └─────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use queue::{Backoff, Delivery, EnqueueOptions, FailedJob, JobId, JobQueue, QueueStats};

/// Job kind used for endpoint probes.
pub const PROBE_JOB_KIND: &str = "probe-endpoint";

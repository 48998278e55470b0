//! Service-based monitoring pipeline
//!
//! This module implements the monitoring pipeline as a set of services.
//! Each service runs as an independent async task communicating via
//! Tokio channels, and touches the outside world only through the
//! capability traits it is constructed with.
//!
//! ## Architecture Overview
//!
//! ```text
//!                     ┌─────────────────┐
//!                     │  main (binary)  │
//!                     └────────┬────────┘
//!                              │ spawns
//!       ┌──────────┬───────────┼───────────┬──────────┐
//!       │          │           │           │          │
//! ┌─────▼────┐ ┌───▼────┐ ┌────▼─────┐ ┌───▼────┐ ┌───▼─────┐
//! │Scheduler │ │ Worker │ │Analytics │ │Alerting│ │Retention│
//! └─────┬────┘ └───┬────┘ └────┬─────┘ └───┬────┘ └───┬─────┘
//!       │          │           │           │          │
//!    cache +    queue +    repository  repository  repository
//!    queue    repository   (rollups)   + cache +   (pruning)
//!                                        email
//! ```
//!
//! ## Service Types
//!
//! - **SchedulerService**: Refreshes the fleet snapshot and fans probe
//!   jobs out to the queue in size-adaptive batches
//! - **WorkerService**: Claims probe jobs under a lease, executes the
//!   HTTP probes and writes exactly one log per delivery
//! - **AnalyticsService**: Rolls probe logs up into daily, monthly and
//!   yearly metrics as each period closes
//! - **AlertingService**: Watches recent probe windows and emails owners
//!   when an endpoint turns problematic
//! - **RetentionService**: Prunes logs and rollups past their horizons
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each service has an mpsc command channel for control
//!    messages
//! 2. **Request/Response**: oneshot channels for synchronous queries
//! 3. **Jobs**: The scheduler and worker never talk directly; probe work
//!    flows through the queue abstraction

pub mod alerting;
pub mod analytics;
pub mod messages;
pub mod retention;
pub mod scheduler;
pub mod worker;

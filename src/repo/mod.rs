//! Persistent store abstraction for users, monitors, endpoints and history
//!
//! This module provides a trait-based abstraction over the relational
//! store the pipeline reads from and writes to.
//!
//! ## Design
//!
//! - **Trait-based**: `Repository` allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio services
//! - **Narrow**: Only the queries the pipeline needs, no generic ORM surface
//!
//! ## Implementations
//!
//! - **In-Memory** (default): No persistence, for the demo binary and tests

pub mod error;
pub mod memory;
pub mod repository;

pub use error::{RepoError, RepoResult};
pub use memory::MemoryRepository;
pub use repository::{ActiveMonitor, Repository, ResponseTimeAggregate, StatusCounts};

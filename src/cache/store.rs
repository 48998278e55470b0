//! Cache store trait definition

use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheResult;

/// Trait for TTL-keyed string caches
///
/// The contract is deliberately narrow: the services only ever need plain
/// get / set-with-expiry access plus a liveness probe at startup. Anything
/// with those semantics (an in-memory map, a Redis instance, a memcached
/// cluster) can back it.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared across
/// all service tasks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value, `None` when the key is absent or its TTL has expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Write a value that expires after `ttl`.
    ///
    /// Writing an existing key replaces both the value and the remaining TTL.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Lightweight liveness probe, called once at service startup.
    async fn ping(&self) -> CacheResult<()>;
}

//! Cache store for cross-service shared state
//!
//! The cache carries the only shared mutable state between the services: the
//! fleet snapshot written by the scheduler and the per-(user, endpoint)
//! alert-cooldown flags written by the alerting engine. Both are plain
//! string values under TTL-keyed string keys, so any store with
//! get / set-with-expiry semantics satisfies the contract.
//!
//! Staleness is bounded purely by TTL. No locking is layered on top.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use store::CacheStore;

/// Key of the cached fleet snapshot (JSON array of `FleetEndpoint`).
pub const FLEET_SNAPSHOT_KEY: &str = "active-endpoints";

/// Prefix of alert-cooldown flags.
pub const ALERT_COOLDOWN_PREFIX: &str = "alert-cooldown";

/// Cache key of the cooldown flag suppressing repeat alerts for one
/// (user, endpoint) pair.
pub fn cooldown_key(user_id: &str, endpoint_id: &str) -> String {
    format!("{ALERT_COOLDOWN_PREFIX}:{user_id}:{endpoint_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_key_scopes_user_and_endpoint() {
        assert_eq!(cooldown_key("usr_1", "ep_9"), "alert-cooldown:usr_1:ep_9");
        assert_ne!(cooldown_key("usr_1", "ep_9"), cooldown_key("usr_2", "ep_9"));
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the coordinator: cache TTLs, lock budget, bus capacity.
///
/// Every field has a serde default so a partial config deserializes
/// cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// TTL for cached session projections, in seconds.
    #[serde(default = "default_session_cache_ttl_secs")]
    pub session_cache_ttl_secs: u64,
    /// TTL for cached task projections, in seconds.
    #[serde(default = "default_task_cache_ttl_secs")]
    pub task_cache_ttl_secs: u64,
    /// TTL on the assignment lock, in seconds.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// How many times lock acquisition is retried before surfacing
    /// `LockUnavailable`.
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    /// Base backoff between lock attempts, in milliseconds. Grows
    /// linearly with the attempt number.
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,
    /// Per-subscriber event bus buffer.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

fn default_session_cache_ttl_secs() -> u64 {
    3600
}

fn default_task_cache_ttl_secs() -> u64 {
    86_400
}

fn default_lock_ttl_secs() -> u64 {
    300
}

fn default_lock_retries() -> u32 {
    3
}

fn default_lock_backoff_ms() -> u64 {
    50
}

fn default_bus_capacity() -> usize {
    256
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            session_cache_ttl_secs: default_session_cache_ttl_secs(),
            task_cache_ttl_secs: default_task_cache_ttl_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_retries: default_lock_retries(),
            lock_backoff_ms: default_lock_backoff_ms(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl CoordinatorConfig {
    /// Session cache TTL.
    pub fn session_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.session_cache_ttl_secs)
    }

    /// Task cache TTL.
    pub fn task_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.task_cache_ttl_secs)
    }

    /// Assignment lock TTL.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Base lock backoff.
    pub fn lock_backoff(&self) -> Duration {
        Duration::from_millis(self.lock_backoff_ms)
    }
}

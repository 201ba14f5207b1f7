use async_trait::async_trait;
use crewline_core::CoordResult;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Key/value cache with per-key time-to-live.
///
/// Never authoritative: a miss or an infrastructure fault always degrades
/// to a store read at the call site.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a value if present and not expired.
    async fn get(&self, key: &str) -> CoordResult<Option<serde_json::Value>>;

    /// Store a value with a TTL.
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> CoordResult<()>;

    /// Invalidate a key. Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> CoordResult<()>;
}

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process cache backed by a map, expiry checked lazily on read.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    /// Whether no live entry exists.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CoordResult<Option<serde_json::Value>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: drop the entry under the write guard.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= Instant::now() {
                entries.remove(key);
            }
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> CoordResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CoordResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

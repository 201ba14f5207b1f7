use async_trait::async_trait;
use crewline_core::CoordResult;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Ownership token returned by a successful acquisition.
///
/// Unique per acquisition, so a delayed release cannot delete a lock that
/// expired and was reacquired by someone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(Uuid);

impl LockToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named, time-bounded mutual exclusion.
///
/// Advisory only: it narrows read-then-write races the single-row CAS
/// cannot close, but callers still rely on conditional updates as the
/// correctness backstop. Expiry guarantees a crashed holder cannot wedge
/// the key.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Set-if-absent with expiry. Returns a token on success, `None` if
    /// the key is already held.
    async fn acquire(&self, key: &str, ttl: Duration) -> CoordResult<Option<LockToken>>;

    /// Compare-and-delete: succeeds only if the stored token matches.
    async fn release(&self, key: &str, token: &LockToken) -> CoordResult<bool>;

    /// Renew the expiry, only if the stored token matches.
    async fn extend(&self, key: &str, token: &LockToken, ttl: Duration) -> CoordResult<bool>;
}

struct Holder {
    token: Uuid,
    expires_at: Instant,
}

/// In-process lock table with the same acquire/release/extend semantics
/// as a SET NX EX + compare-and-delete key store.
pub struct MemoryLockManager {
    holders: Mutex<HashMap<String, Holder>>,
}

impl MemoryLockManager {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self {
            holders: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> CoordResult<Option<LockToken>> {
        let mut holders = self.holders.lock().await;
        let now = Instant::now();
        match holders.get(key) {
            Some(holder) if holder.expires_at > now => Ok(None),
            _ => {
                let token = LockToken::new();
                holders.insert(
                    key.to_string(),
                    Holder {
                        token: token.0,
                        expires_at: now + ttl,
                    },
                );
                Ok(Some(token))
            }
        }
    }

    async fn release(&self, key: &str, token: &LockToken) -> CoordResult<bool> {
        let mut holders = self.holders.lock().await;
        match holders.get(key) {
            Some(holder) if holder.token == token.0 && holder.expires_at > Instant::now() => {
                holders.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn extend(&self, key: &str, token: &LockToken, ttl: Duration) -> CoordResult<bool> {
        let mut holders = self.holders.lock().await;
        match holders.get_mut(key) {
            Some(holder) if holder.token == token.0 && holder.expires_at > Instant::now() => {
                holder.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

//! Ephemeral coordination layer: cache, distributed lock, event bus.
//!
//! Nothing in this crate is authoritative. The cache is a read accelerator
//! that is invalidated (never updated) on writes; the lock is advisory and
//! time-bounded; the bus is fire-and-forget with no replay. The durable
//! store remains the single source of truth.

/// Key/value cache with per-key expiry.
pub mod cache;
/// Named, token-owned, time-bounded mutual exclusion.
pub mod lock;
/// Broadcast publish/subscribe for state-change notification.
pub mod bus;

pub use bus::{EventBus, Published, Subscription};
pub use cache::{Cache, MemoryCache};
pub use lock::{LockManager, LockToken, MemoryLockManager};

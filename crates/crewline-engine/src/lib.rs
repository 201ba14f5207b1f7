//! Session and task coordination engine.
//!
//! The [`Coordinator`] composes the durable store, cache, lock manager,
//! and event bus into one API for driving sessions, tasks, and agents
//! through their lifecycles. Correctness under concurrency comes from the
//! store's conditional updates; the cache is invalidated on every write,
//! and the bus announces what happened without ever being relied on.
//!
//! ```no_run
//! use crewline_engine::{Coordinator, CoordinatorConfig};
//! use crewline_store::MemoryStore;
//! use crewline_sync::{MemoryCache, MemoryLockManager};
//! use crewline_core::Priority;
//! use std::sync::Arc;
//!
//! # async fn demo() -> crewline_core::CoordResult<()> {
//! let engine = Coordinator::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryCache::new()),
//!     Arc::new(MemoryLockManager::new()),
//!     CoordinatorConfig::default(),
//! );
//! let session = engine
//!     .create_session("Release prep", Priority::High, None, vec![], Default::default())
//!     .await?;
//! engine.start_session(&session.identifier).await?;
//! # Ok(())
//! # }
//! ```

/// Engine tunables.
pub mod config;
/// The coordinator.
pub mod engine;
/// Execution boundary.
pub mod executor;
/// Ready-to-assign ordering.
pub mod ready_queue;
/// Dependency fan-out.
pub mod resolver;

pub use config::CoordinatorConfig;
pub use engine::{Coordinator, SessionProgress};
pub use executor::{run_task, ExecutorError, TaskExecutor};
pub use ready_queue::{ReadyEntry, ReadyQueue};
pub use resolver::DependencyResolver;

//! Durable-store boundary for the Crewline coordination engine.
//!
//! Every mutation takes the status the caller expects the record to be in
//! and applies a compare-and-swap against it: a mismatch returns
//! [`crewline_core::CoordError::PreconditionFailed`] and writes nothing.
//! This conditional update is the load-bearing correctness mechanism under
//! concurrent writers; callers never read-modify-write blindly.
//!
//! Two implementations: [`MemoryStore`] for tests and single-process use,
//! and `SqliteStore` (feature `sqlite`) where the CAS is a single
//! `UPDATE ... WHERE identifier = ? AND status = ?` checked by changed
//! row count.

/// In-memory store.
pub mod memory;
/// Repository traits.
pub mod repo;
/// SQLite-backed store.
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
pub use repo::{AgentRepo, SessionRepo, Store, TaskRepo};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

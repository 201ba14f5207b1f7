//! Domain layer for the Crewline coordination engine.
//!
//! Sessions group units of work; tasks carry a lifecycle state machine and
//! an optional dependency set; agents are coordination records tracking the
//! worker a task is assigned to. Both state machines are closed enums with
//! explicit transition guards so an illegal transition is rejected before
//! anything is written.
//!
//! # Main types
//!
//! - [`Session`] / [`SessionStatus`]: top-level unit of coordinated work.
//! - [`Task`] / [`TaskStatus`]: schedulable unit with dependency gating.
//! - [`Agent`] / [`AgentStatus`]: worker coordination record with metrics.
//! - [`CoordError`]: the error taxonomy shared across the workspace.

/// Worker coordination records and rolling metrics.
pub mod agent;
/// Event channel naming conventions.
pub mod channels;
/// Error taxonomy and result alias.
pub mod error;
/// Session record and status state machine.
pub mod session;
/// Task record and status state machine.
pub mod task;

pub use agent::{Agent, AgentStatus};
pub use error::{CoordError, CoordResult};
pub use session::{Priority, Session, SessionStatus};
pub use task::{Task, TaskStatus};

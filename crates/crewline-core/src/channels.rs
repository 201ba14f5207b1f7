//! Event channel naming.
//!
//! Channels are plain strings; ordering is guaranteed per channel only.

/// Session lifecycle events.
pub const SESSION_EVENTS: &str = "crewline:sessions:events";

/// Task lifecycle events.
pub const TASK_EVENTS: &str = "crewline:tasks:updates";

/// System-wide events (agent registration, infrastructure warnings).
pub const SYSTEM_EVENTS: &str = "crewline:system:events";

/// Per-agent command channel, watched by the agent itself.
pub fn agent_commands(agent_identifier: &str) -> String {
    format!("crewline:agent:{agent_identifier}:commands")
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coordination status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Free to take a task.
    Available,
    /// Holding a task.
    Busy,
    /// Not reachable.
    Offline,
    /// Last operation left the worker in an error state.
    Error,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Available => "available",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
            AgentStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Coordination record for an executing worker.
///
/// This tracks assignment state and rolling metrics only; the worker's
/// execution logic lives behind the `TaskExecutor` boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Durable opaque id.
    pub id: Uuid,
    /// Short, externally referenced, unique identifier.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Coordination status.
    pub status: AgentStatus,
    /// Identifier of the task currently held, if any.
    pub current_task: Option<String>,
    /// Tasks completed successfully.
    pub tasks_completed: u64,
    /// Tasks that ended in failure.
    pub tasks_failed: u64,
    /// Streaming mean of successful task duration, in seconds.
    pub average_task_secs: f64,
    /// `completed / (completed + failed)`, in `[0, 1]`. 1.0 until the
    /// first outcome is recorded.
    pub success_rate: f64,
    /// Last recorded error message, if any.
    pub last_error: Option<String>,
    /// Timestamp of the last recorded error.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Touched on every coordination mutation.
    pub last_active_at: DateTime<Utc>,
}

impl Agent {
    /// Register a new, available agent.
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            identifier: identifier.into(),
            name: name.into(),
            status: AgentStatus::Available,
            current_task: None,
            tasks_completed: 0,
            tasks_failed: 0,
            average_task_secs: 0.0,
            success_rate: 1.0,
            last_error: None,
            last_error_at: None,
            created_at: now,
            last_active_at: now,
        }
    }

    /// Mark the agent busy on a task.
    pub fn set_busy(&mut self, task_identifier: impl Into<String>) {
        self.status = AgentStatus::Busy;
        self.current_task = Some(task_identifier.into());
        self.last_active_at = Utc::now();
    }

    /// Release the agent back to the pool.
    pub fn set_available(&mut self) {
        self.status = AgentStatus::Available;
        self.current_task = None;
        self.last_active_at = Utc::now();
    }

    /// Take the agent out of rotation.
    pub fn set_offline(&mut self) {
        self.status = AgentStatus::Offline;
        self.current_task = None;
        self.last_active_at = Utc::now();
    }

    /// Put the agent in an error state with a message.
    pub fn set_error(&mut self, message: &str) {
        self.status = AgentStatus::Error;
        self.last_error = Some(message.to_string());
        self.last_error_at = Some(Utc::now());
        self.last_active_at = Utc::now();
    }

    /// Record a successful completion with its duration.
    ///
    /// The average is a streaming mean over successful runs:
    /// `avg += (duration - avg) / completed_count`. No per-run history is
    /// kept.
    pub fn record_completion(&mut self, duration_secs: f64) {
        self.tasks_completed += 1;
        self.average_task_secs +=
            (duration_secs - self.average_task_secs) / self.tasks_completed as f64;
        self.recompute_success_rate();
        self.last_active_at = Utc::now();
    }

    /// Record a failed run with its error detail.
    pub fn record_failure(&mut self, error: &str) {
        self.tasks_failed += 1;
        self.last_error = Some(error.to_string());
        self.last_error_at = Some(Utc::now());
        self.recompute_success_rate();
        self.last_active_at = Utc::now();
    }

    fn recompute_success_rate(&mut self) {
        let total = self.tasks_completed + self.tasks_failed;
        if total > 0 {
            self.success_rate = self.tasks_completed as f64 / total as f64;
        }
    }

    /// Whether the agent can take a new task.
    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Available
    }
}

use crate::session::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Task lifecycle states.
///
/// `Pending → Assigned → InProgress → {Completed | Failed | UnderReview}`.
/// A task with unmet dependencies sits in `Blocked` until the dependency
/// resolver moves it to `Pending`. `Cancelled` is reachable from any
/// non-terminal state; `Failed` is retryable and therefore not terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Ready to be picked up; all dependencies satisfied.
    Pending,
    /// Waiting on one or more dependencies.
    Blocked,
    /// Claimed by an agent, not yet started.
    Assigned,
    /// Being executed.
    InProgress,
    /// Execution finished; awaiting a review verdict.
    UnderReview,
    /// Terminal success.
    Completed,
    /// Recorded failure; eligible for retry.
    Failed,
    /// Terminal cancellation.
    Cancelled,
}

impl TaskStatus {
    /// Completed and Cancelled tasks are immutable.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Transition guard table.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Blocked, Pending) => true,
            (Pending, Blocked) => true,
            (Pending, Assigned) => true,
            (Pending | Assigned, InProgress) => true,
            (InProgress, Completed | UnderReview) => true,
            (UnderReview, Completed) => true,
            // Retry: back to Pending, or Blocked if dependencies remain.
            (Failed, Pending | Blocked) => true,
            // Fail/Cancel from any non-terminal state.
            (Pending | Blocked | Assigned | InProgress | UnderReview, Failed) => true,
            (Pending | Blocked | Assigned | InProgress | UnderReview | Failed, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::UnderReview => "under_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A unit of work belonging to exactly one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Durable opaque id.
    pub id: Uuid,
    /// Short, externally referenced, unique identifier.
    pub identifier: String,
    /// Owning session id.
    pub session_id: Uuid,
    /// Short title.
    pub title: String,
    /// Free-form description handed to the executor.
    pub description: Option<String>,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Priority band; drives ready-queue ordering.
    pub priority: Priority,
    /// Agent currently holding the task, if any.
    pub assigned_agent: Option<String>,
    /// Project reference.
    pub project: String,
    /// Identifiers of tasks that must complete before this one may run.
    /// Shrinks monotonically via the dependency resolver.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Result payload recorded on completion.
    pub result: Option<serde_json::Value>,
    /// Error detail recorded on failure.
    pub error_details: Option<String>,
    /// Number of times the task was retried after a failure.
    #[serde(default)]
    pub retry_count: u32,
    /// Open metadata map (cancellation reason, review notes, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set on the InProgress transition.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the task reaches Completed, Failed, or Cancelled.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task in `Pending` under the given session.
    pub fn new(
        identifier: impl Into<String>,
        session_id: Uuid,
        title: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier: identifier.into(),
            session_id,
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            priority,
            assigned_agent: None,
            project: "default".to_string(),
            dependencies: Vec::new(),
            result: None,
            error_details: None,
            retry_count: 0,
            metadata: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a project reference.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Attach dependencies. A non-empty set puts the task in `Blocked`.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        if !dependencies.is_empty() {
            self.status = TaskStatus::Blocked;
        }
        self.dependencies = dependencies;
        self
    }

    /// Record an assignment.
    pub fn assign_to(&mut self, agent: impl Into<String>) {
        self.status = TaskStatus::Assigned;
        self.assigned_agent = Some(agent.into());
    }

    /// Apply the InProgress transition.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Apply the Completed transition, recording the result payload.
    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
    }

    /// Apply the Failed transition, recording the error detail.
    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_details = Some(error.to_string());
    }

    /// Apply the Cancelled transition, recording an optional reason.
    pub fn cancel(&mut self, reason: Option<&str>) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        if let Some(reason) = reason {
            self.metadata
                .insert("cancellation_reason".to_string(), reason.into());
        }
    }

    /// Apply the UnderReview transition.
    pub fn submit_for_review(&mut self) {
        self.status = TaskStatus::UnderReview;
    }

    /// Apply the Failed → Pending retry transition. The assignment is
    /// released so the task can be claimed afresh; unmet dependencies put
    /// it back in `Blocked` instead.
    pub fn retry(&mut self) {
        self.status = if self.dependencies.is_empty() {
            TaskStatus::Pending
        } else {
            TaskStatus::Blocked
        };
        self.retry_count += 1;
        self.assigned_agent = None;
        self.error_details = None;
        self.started_at = None;
        self.completed_at = None;
    }

    /// Drop a satisfied dependency. Returns true if it was present.
    pub fn remove_dependency(&mut self, identifier: &str) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|d| d != identifier);
        self.dependencies.len() < before
    }

    /// Elapsed execution time in seconds, if the task ran to an end state.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Ordinal priority shared by sessions and tasks.
///
/// Derives `Ord` so ready-queue ordering can compare bands directly
/// (`Low < Medium < High < Urgent < Critical`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default band.
    #[default]
    Medium,
    /// Elevated.
    High,
    /// Needs attention ahead of regular work.
    Urgent,
    /// Preempts everything else in the queue ordering.
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Session lifecycle states.
///
/// `Planning → Active ⇄ Paused → {Completed | Failed | Cancelled} → Archived`.
/// Fail and Cancel are reachable from any non-finished state. Sessions are
/// never deleted; a finished session is archived instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Initial state: tasks are being laid out.
    Planning,
    /// Work in progress.
    Active,
    /// Temporarily suspended; resumable.
    Paused,
    /// All coordinated work concluded successfully.
    Completed,
    /// Concluded with a recorded failure reason.
    Failed,
    /// Concluded by explicit cancellation.
    Cancelled,
    /// Terminal. Finished sessions move here instead of being removed.
    Archived,
}

impl SessionStatus {
    /// A finished session can only be archived.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Archived is the single terminal state.
    pub fn is_terminal(self) -> bool {
        self == Self::Archived
    }

    /// Transition guard table. Every engine write validates against this
    /// before issuing the conditional update.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Planning, Active) => true,
            (Active, Paused) | (Paused, Active) => true,
            (Active | Paused, Completed) => true,
            // Fail/Cancel from any non-finished, non-archived state.
            (Planning | Active | Paused, Failed | Cancelled) => true,
            (Completed | Failed | Cancelled, Archived) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Planning => "planning",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

/// A unit of coordinated effort grouping related tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Durable opaque id.
    pub id: Uuid,
    /// Short, externally referenced, unique identifier.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Lifecycle state.
    pub status: SessionStatus,
    /// Priority band.
    pub priority: Priority,
    /// Project references this session touches.
    pub projects: Vec<String>,
    /// Open metadata map (pause reason, failure reason, summary, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set on the Planning → Active transition.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the session finishes.
    pub completed_at: Option<DateTime<Utc>>,
    /// Touched on every mutation.
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    /// Create a session in `Planning`.
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            identifier: identifier.into(),
            name: name.into(),
            description: None,
            status: SessionStatus::Planning,
            priority,
            projects: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            started_at: None,
            completed_at: None,
            last_active_at: now,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach project references.
    pub fn with_projects(mut self, projects: Vec<String>) -> Self {
        self.projects = projects;
        self
    }

    /// Attach initial metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Update the activity timestamp.
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Apply the Active transition.
    pub fn start(&mut self) {
        self.status = SessionStatus::Active;
        self.started_at = Some(Utc::now());
        self.touch();
    }

    /// Apply the Paused transition, recording the reason.
    pub fn pause(&mut self, reason: Option<&str>) {
        self.status = SessionStatus::Paused;
        if let Some(reason) = reason {
            self.metadata
                .insert("pause_reason".to_string(), reason.into());
        }
        self.touch();
    }

    /// Apply the Paused → Active transition.
    pub fn resume(&mut self) {
        self.status = SessionStatus::Active;
        self.metadata.remove("pause_reason");
        self.touch();
    }

    /// Apply the Completed transition, recording an optional summary.
    pub fn complete(&mut self, summary: Option<&str>) {
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        if let Some(summary) = summary {
            self.metadata
                .insert("result_summary".to_string(), summary.into());
        }
        self.touch();
    }

    /// Apply the Failed transition, recording the reason.
    pub fn fail(&mut self, reason: &str) {
        self.status = SessionStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.metadata
            .insert("failure_reason".to_string(), reason.into());
        self.touch();
    }

    /// Apply the Cancelled transition, recording an optional reason.
    pub fn cancel(&mut self, reason: Option<&str>) {
        self.status = SessionStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        if let Some(reason) = reason {
            self.metadata
                .insert("cancellation_reason".to_string(), reason.into());
        }
        self.touch();
    }

    /// Apply the Archived transition.
    pub fn archive(&mut self) {
        self.status = SessionStatus::Archived;
        self.touch();
    }
}

use async_trait::async_trait;
use crewline_core::{Agent, AgentStatus, CoordResult, Session, SessionStatus, Task, TaskStatus};
use uuid::Uuid;

/// Session persistence with conditional updates.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Insert a new session. Fails on a duplicate identifier.
    async fn create_session(&self, session: &Session) -> CoordResult<()>;

    /// Look up a session by its external identifier.
    async fn get_session(&self, identifier: &str) -> CoordResult<Option<Session>>;

    /// Replace the stored record only if its current status matches
    /// `expected`. A mismatch is `PreconditionFailed`; a missing record is
    /// `NotFound`.
    async fn update_session(&self, session: &Session, expected: SessionStatus) -> CoordResult<()>;

    /// All sessions, unordered.
    async fn list_sessions(&self) -> CoordResult<Vec<Session>>;
}

/// Task persistence with conditional updates and the assignment claim.
#[async_trait]
pub trait TaskRepo: Send + Sync {
    /// Insert a new task. Fails on a duplicate identifier.
    async fn create_task(&self, task: &Task) -> CoordResult<()>;

    /// Look up a task by its external identifier.
    async fn get_task(&self, identifier: &str) -> CoordResult<Option<Task>>;

    /// Replace the stored record only if its current status matches
    /// `expected`.
    async fn update_task(&self, task: &Task, expected: TaskStatus) -> CoordResult<()>;

    /// Exclusive assignment claim: requires current status `Pending` AND
    /// no assigned agent, atomically sets both. Exactly one of N
    /// concurrent claimers succeeds; the rest get `PreconditionFailed`.
    /// Returns the updated record.
    async fn claim_task(&self, identifier: &str, agent_identifier: &str) -> CoordResult<Task>;

    /// All tasks belonging to a session.
    async fn list_session_tasks(&self, session_id: Uuid) -> CoordResult<Vec<Task>>;

    /// Tasks currently `Blocked` whose dependency set contains the given
    /// identifier. Backs the dependency-resolver fan-out scan.
    async fn blocked_tasks_depending_on(&self, dep_identifier: &str) -> CoordResult<Vec<Task>>;
}

/// Agent coordination-record persistence.
#[async_trait]
pub trait AgentRepo: Send + Sync {
    /// Insert a new agent record. Fails on a duplicate identifier.
    async fn create_agent(&self, agent: &Agent) -> CoordResult<()>;

    /// Look up an agent by its external identifier.
    async fn get_agent(&self, identifier: &str) -> CoordResult<Option<Agent>>;

    /// Replace the stored record only if its current status matches
    /// `expected`.
    async fn update_agent(&self, agent: &Agent, expected: AgentStatus) -> CoordResult<()>;

    /// All agent records, unordered.
    async fn list_agents(&self) -> CoordResult<Vec<Agent>>;
}

/// The full store boundary the engine composes over.
pub trait Store: SessionRepo + TaskRepo + AgentRepo {}

impl<T: SessionRepo + TaskRepo + AgentRepo> Store for T {}

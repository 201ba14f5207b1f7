use crate::repo::{AgentRepo, SessionRepo, TaskRepo};
use async_trait::async_trait;
use crewline_core::{
    Agent, AgentStatus, CoordError, CoordResult, Session, SessionStatus, Task, TaskStatus,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory store keyed by external identifier.
///
/// The compare-and-swap happens under the map's write guard, which makes
/// each per-record update linearizable the same way a single-row
/// conditional UPDATE is.
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    tasks: RwLock<HashMap<String, Task>>,
    agents: RwLock<HashMap<String, Agent>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            agents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn create_session(&self, session: &Session) -> CoordResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.identifier) {
            return Err(CoordError::Store(format!(
                "duplicate session identifier: {}",
                session.identifier
            )));
        }
        sessions.insert(session.identifier.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, identifier: &str) -> CoordResult<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(identifier).cloned())
    }

    async fn update_session(&self, session: &Session, expected: SessionStatus) -> CoordResult<()> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&session.identifier)
            .ok_or_else(|| CoordError::not_found("session", &session.identifier))?;
        if stored.status != expected {
            return Err(CoordError::precondition(
                "session",
                &session.identifier,
                expected.to_string(),
            ));
        }
        *stored = session.clone();
        Ok(())
    }

    async fn list_sessions(&self) -> CoordResult<Vec<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().cloned().collect())
    }
}

#[async_trait]
impl TaskRepo for MemoryStore {
    async fn create_task(&self, task: &Task) -> CoordResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.identifier) {
            return Err(CoordError::Store(format!(
                "duplicate task identifier: {}",
                task.identifier
            )));
        }
        tasks.insert(task.identifier.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, identifier: &str) -> CoordResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(identifier).cloned())
    }

    async fn update_task(&self, task: &Task, expected: TaskStatus) -> CoordResult<()> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(&task.identifier)
            .ok_or_else(|| CoordError::not_found("task", &task.identifier))?;
        if stored.status != expected {
            return Err(CoordError::precondition(
                "task",
                &task.identifier,
                expected.to_string(),
            ));
        }
        *stored = task.clone();
        Ok(())
    }

    async fn claim_task(&self, identifier: &str, agent_identifier: &str) -> CoordResult<Task> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(identifier)
            .ok_or_else(|| CoordError::not_found("task", identifier))?;
        if stored.status != TaskStatus::Pending || stored.assigned_agent.is_some() {
            return Err(CoordError::precondition(
                "task",
                identifier,
                "pending and unassigned",
            ));
        }
        stored.assign_to(agent_identifier);
        Ok(stored.clone())
    }

    async fn list_session_tasks(&self, session_id: Uuid) -> CoordResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn blocked_tasks_depending_on(&self, dep_identifier: &str) -> CoordResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Blocked
                    && t.dependencies.iter().any(|d| d == dep_identifier)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AgentRepo for MemoryStore {
    async fn create_agent(&self, agent: &Agent) -> CoordResult<()> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(&agent.identifier) {
            return Err(CoordError::Store(format!(
                "duplicate agent identifier: {}",
                agent.identifier
            )));
        }
        agents.insert(agent.identifier.clone(), agent.clone());
        Ok(())
    }

    async fn get_agent(&self, identifier: &str) -> CoordResult<Option<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents.get(identifier).cloned())
    }

    async fn update_agent(&self, agent: &Agent, expected: AgentStatus) -> CoordResult<()> {
        let mut agents = self.agents.write().await;
        let stored = agents
            .get_mut(&agent.identifier)
            .ok_or_else(|| CoordError::not_found("agent", &agent.identifier))?;
        if stored.status != expected {
            return Err(CoordError::precondition(
                "agent",
                &agent.identifier,
                expected.to_string(),
            ));
        }
        *stored = agent.clone();
        Ok(())
    }

    async fn list_agents(&self) -> CoordResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents.values().cloned().collect())
    }
}

use crate::repo::{AgentRepo, SessionRepo, TaskRepo};
use async_trait::async_trait;
use crewline_core::{
    Agent, AgentStatus, CoordError, CoordResult, Session, SessionStatus, Task, TaskStatus,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tokio::sync::Mutex;
use uuid::Uuid;

/// SQLite-backed store.
///
/// Records are stored as a JSON `data` column next to the columns the
/// conditional updates key on (`identifier`, `status`, and for tasks
/// `session_id` / `assigned_agent`). Every mutation is a single
/// `UPDATE ... WHERE identifier = ? AND status = ?` whose changed-row
/// count decides success; there is no read-modify-write on the status.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    identifier TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    data       TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tasks (
    identifier     TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL,
    status         TEXT NOT NULL,
    assigned_agent TEXT,
    data           TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS agents (
    identifier TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    data       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_session ON tasks (session_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status);
";

fn store_err(e: rusqlite::Error) -> CoordError {
    CoordError::Store(e.to_string())
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> CoordResult<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store.
    pub fn open_in_memory() -> CoordResult<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> CoordResult<Self> {
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_exists(conn: &Connection, table: &str, identifier: &str) -> CoordResult<bool> {
        let sql = format!("SELECT 1 FROM {table} WHERE identifier = ?1");
        conn.query_row(&sql, params![identifier], |_| Ok(()))
            .optional()
            .map(|r| r.is_some())
            .map_err(store_err)
    }
}

#[async_trait]
impl SessionRepo for SqliteStore {
    async fn create_session(&self, session: &Session) -> CoordResult<()> {
        let data = serde_json::to_string(session)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (identifier, status, data) VALUES (?1, ?2, ?3)",
            params![session.identifier, session.status.to_string(), data],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_session(&self, identifier: &str) -> CoordResult<Option<Session>> {
        let conn = self.conn.lock().await;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM sessions WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn update_session(&self, session: &Session, expected: SessionStatus) -> CoordResult<()> {
        let data = serde_json::to_string(session)?;
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE sessions SET status = ?1, data = ?2 \
                 WHERE identifier = ?3 AND status = ?4",
                params![
                    session.status.to_string(),
                    data,
                    session.identifier,
                    expected.to_string()
                ],
            )
            .map_err(store_err)?;
        if changed == 1 {
            return Ok(());
        }
        if Self::row_exists(&conn, "sessions", &session.identifier)? {
            Err(CoordError::precondition(
                "session",
                &session.identifier,
                expected.to_string(),
            ))
        } else {
            Err(CoordError::not_found("session", &session.identifier))
        }
    }

    async fn list_sessions(&self) -> CoordResult<Vec<Session>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT data FROM sessions")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        let mut sessions = Vec::new();
        for row in rows {
            let data = row.map_err(store_err)?;
            sessions.push(serde_json::from_str(&data)?);
        }
        Ok(sessions)
    }
}

#[async_trait]
impl TaskRepo for SqliteStore {
    async fn create_task(&self, task: &Task) -> CoordResult<()> {
        let data = serde_json::to_string(task)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tasks (identifier, session_id, status, assigned_agent, data) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task.identifier,
                task.session_id.to_string(),
                task.status.to_string(),
                task.assigned_agent,
                data
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_task(&self, identifier: &str) -> CoordResult<Option<Task>> {
        let conn = self.conn.lock().await;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM tasks WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn update_task(&self, task: &Task, expected: TaskStatus) -> CoordResult<()> {
        let data = serde_json::to_string(task)?;
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?1, assigned_agent = ?2, data = ?3 \
                 WHERE identifier = ?4 AND status = ?5",
                params![
                    task.status.to_string(),
                    task.assigned_agent,
                    data,
                    task.identifier,
                    expected.to_string()
                ],
            )
            .map_err(store_err)?;
        if changed == 1 {
            return Ok(());
        }
        if Self::row_exists(&conn, "tasks", &task.identifier)? {
            Err(CoordError::precondition(
                "task",
                &task.identifier,
                expected.to_string(),
            ))
        } else {
            Err(CoordError::not_found("task", &task.identifier))
        }
    }

    async fn claim_task(&self, identifier: &str, agent_identifier: &str) -> CoordResult<Task> {
        let conn = self.conn.lock().await;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM tasks WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        let mut task: Task = match data {
            Some(data) => serde_json::from_str(&data)?,
            None => return Err(CoordError::not_found("task", identifier)),
        };
        task.assign_to(agent_identifier);
        let data = serde_json::to_string(&task)?;

        // The WHERE clause is the claim: status must still be pending and
        // the slot unassigned at write time, regardless of what we read.
        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?1, assigned_agent = ?2, data = ?3 \
                 WHERE identifier = ?4 AND status = 'pending' AND assigned_agent IS NULL",
                params![task.status.to_string(), agent_identifier, data, identifier],
            )
            .map_err(store_err)?;
        if changed == 1 {
            Ok(task)
        } else {
            Err(CoordError::precondition(
                "task",
                identifier,
                "pending and unassigned",
            ))
        }
    }

    async fn list_session_tasks(&self, session_id: Uuid) -> CoordResult<Vec<Task>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT data FROM tasks WHERE session_id = ?1")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![session_id.to_string()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(store_err)?;
        let mut tasks = Vec::new();
        for row in rows {
            let data = row.map_err(store_err)?;
            tasks.push(serde_json::from_str(&data)?);
        }
        Ok(tasks)
    }

    async fn blocked_tasks_depending_on(&self, dep_identifier: &str) -> CoordResult<Vec<Task>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT data FROM tasks WHERE status = 'blocked'")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        let mut tasks = Vec::new();
        for row in rows {
            let data = row.map_err(store_err)?;
            let task: Task = serde_json::from_str(&data)?;
            if task.dependencies.iter().any(|d| d == dep_identifier) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }
}

#[async_trait]
impl AgentRepo for SqliteStore {
    async fn create_agent(&self, agent: &Agent) -> CoordResult<()> {
        let data = serde_json::to_string(agent)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO agents (identifier, status, data) VALUES (?1, ?2, ?3)",
            params![agent.identifier, agent.status.to_string(), data],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_agent(&self, identifier: &str) -> CoordResult<Option<Agent>> {
        let conn = self.conn.lock().await;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM agents WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn update_agent(&self, agent: &Agent, expected: AgentStatus) -> CoordResult<()> {
        let data = serde_json::to_string(agent)?;
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE agents SET status = ?1, data = ?2 \
                 WHERE identifier = ?3 AND status = ?4",
                params![
                    agent.status.to_string(),
                    data,
                    agent.identifier,
                    expected.to_string()
                ],
            )
            .map_err(store_err)?;
        if changed == 1 {
            return Ok(());
        }
        if Self::row_exists(&conn, "agents", &agent.identifier)? {
            Err(CoordError::precondition(
                "agent",
                &agent.identifier,
                expected.to_string(),
            ))
        } else {
            Err(CoordError::not_found("agent", &agent.identifier))
        }
    }

    async fn list_agents(&self) -> CoordResult<Vec<Agent>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT data FROM agents").map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        let mut agents = Vec::new();
        for row in rows {
            let data = row.map_err(store_err)?;
            agents.push(serde_json::from_str(&data)?);
        }
        Ok(agents)
    }
}

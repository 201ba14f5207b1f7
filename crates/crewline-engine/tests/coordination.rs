//! End-to-end coordination scenarios over the in-memory backends.

use crewline_core::{
    channels, Agent, AgentStatus, CoordError, CoordResult, Priority, Session, SessionStatus, Task,
    TaskStatus,
};
use crewline_engine::{run_task, Coordinator, CoordinatorConfig, ExecutorError, TaskExecutor};
use crewline_store::{AgentRepo, MemoryStore, SessionRepo, TaskRepo};
use crewline_sync::{LockManager, LockToken, MemoryCache, MemoryLockManager};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("crewline=debug")
        .with_test_writer()
        .try_init();
}

fn engine() -> Coordinator {
    init_tracing();
    Coordinator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryLockManager::new()),
        CoordinatorConfig::default(),
    )
}

/// Drive one task from Pending through Completed for the given agent.
async fn finish_task(engine: &Coordinator, task: &str, agent: &str) {
    assert!(engine.assign_task(task, agent).await.unwrap());
    assert!(engine.start_task(task).await.unwrap());
    assert!(engine
        .complete_task(task, json!({"ok": true}))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_session_lifecycle_end_to_end() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();

    let session = engine
        .create_session(
            "Release prep",
            Priority::High,
            Some("ship the release"),
            vec![],
            HashMap::new(),
        )
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Planning);
    assert!(engine.start_session(&session.identifier).await.unwrap());

    let t1 = engine
        .create_task(&session.identifier, "Write changelog", Priority::Medium, vec![])
        .await
        .unwrap();
    let t2 = engine
        .create_task(&session.identifier, "Tag release", Priority::Medium, vec![])
        .await
        .unwrap();

    finish_task(&engine, &t1.identifier, "worker-1").await;
    finish_task(&engine, &t2.identifier, "worker-1").await;

    let progress = engine
        .get_session_progress(&session.identifier)
        .await
        .unwrap();
    assert_eq!(progress.total, 2);
    assert_eq!(progress.completed, 2);
    assert_eq!(progress.failed, 0);
    assert!((progress.percentage - 100.0).abs() < f64::EPSILON);

    assert!(engine
        .complete_session(&session.identifier, Some("all shipped"))
        .await
        .unwrap());
    assert!(engine.archive_session(&session.identifier).await.unwrap());

    let stored = engine.get_session(&session.identifier).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Archived);
}

#[tokio::test]
async fn test_dependency_chain_unblocks_in_order() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Chained", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();

    let a = engine
        .create_task(&session.identifier, "A", Priority::Medium, vec![])
        .await
        .unwrap();
    let b = engine
        .create_task(
            &session.identifier,
            "B",
            Priority::Medium,
            vec![a.identifier.clone()],
        )
        .await
        .unwrap();
    let c = engine
        .create_task(
            &session.identifier,
            "C",
            Priority::Medium,
            vec![b.identifier.clone()],
        )
        .await
        .unwrap();

    assert_eq!(b.status, TaskStatus::Blocked);
    assert_eq!(c.status, TaskStatus::Blocked);

    finish_task(&engine, &a.identifier, "worker-1").await;

    // Completing A frees B but not C.
    let b_now = engine.get_task(&b.identifier).await.unwrap().unwrap();
    assert_eq!(b_now.status, TaskStatus::Pending);
    let c_now = engine.get_task(&c.identifier).await.unwrap().unwrap();
    assert_eq!(c_now.status, TaskStatus::Blocked);

    finish_task(&engine, &b.identifier, "worker-1").await;
    let c_now = engine.get_task(&c.identifier).await.unwrap().unwrap();
    assert_eq!(c_now.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_dangling_dependency_is_not_found() {
    let engine = engine();
    let session = engine
        .create_session("Strict deps", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();

    let err = engine
        .create_task(
            &session.identifier,
            "Orphan",
            Priority::Medium,
            vec!["t-missing".to_string()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::NotFound { .. }));
}

#[tokio::test]
async fn test_completed_dependency_dropped_at_creation() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Late joiner", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();

    let a = engine
        .create_task(&session.identifier, "A", Priority::Medium, vec![])
        .await
        .unwrap();
    finish_task(&engine, &a.identifier, "worker-1").await;

    // A is already done, so the new task starts Pending.
    let b = engine
        .create_task(
            &session.identifier,
            "B",
            Priority::Medium,
            vec![a.identifier.clone()],
        )
        .await
        .unwrap();
    assert_eq!(b.status, TaskStatus::Pending);
    assert!(b.dependencies.is_empty());
}

#[tokio::test]
async fn test_concurrent_assignment_has_one_winner() {
    let engine = Arc::new(engine());
    let session = engine
        .create_session("Contended", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();
    let task = engine
        .create_task(&session.identifier, "Hot task", Priority::High, vec![])
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let agent = format!("worker-{i}");
        engine.register_agent(&agent, &agent).await.unwrap();
        let engine = engine.clone();
        let task_identifier = task.identifier.clone();
        handles.push(tokio::spawn(async move {
            engine.assign_task(&task_identifier, &agent).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let stored = engine.get_task(&task.identifier).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Assigned);
    assert!(stored.assigned_agent.is_some());
}

#[tokio::test]
async fn test_double_complete_does_not_double_count_metrics() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Exactly once", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();
    let task = engine
        .create_task(&session.identifier, "One shot", Priority::Medium, vec![])
        .await
        .unwrap();

    finish_task(&engine, &task.identifier, "worker-1").await;

    // Second completion loses the conditional update.
    assert!(!engine
        .complete_task(&task.identifier, json!({"ok": true}))
        .await
        .unwrap());

    let agent = engine.get_agent("worker-1").await.unwrap().unwrap();
    assert_eq!(agent.tasks_completed, 1);
    assert_eq!(agent.tasks_failed, 0);
    assert!(agent.is_available());
}

#[tokio::test]
async fn test_cached_read_reflects_transition() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Fresh reads", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();
    let task = engine
        .create_task(&session.identifier, "Watched", Priority::Medium, vec![])
        .await
        .unwrap();

    // Warm the cache, then transition and read again.
    let warm = engine.get_task(&task.identifier).await.unwrap().unwrap();
    assert_eq!(warm.status, TaskStatus::Pending);

    engine.assign_task(&task.identifier, "worker-1").await.unwrap();
    let after = engine.get_task(&task.identifier).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Assigned);

    engine.start_task(&task.identifier).await.unwrap();
    let after = engine.get_task(&task.identifier).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_invalid_transition_is_rejected_without_error() {
    let engine = engine();
    let session = engine
        .create_session("Guarded", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();

    // Planning cannot complete directly.
    assert!(!engine
        .complete_session(&session.identifier, None)
        .await
        .unwrap());
    let stored = engine.get_session(&session.identifier).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Planning);

    // A missing record is an error, not a quiet false.
    let err = engine.start_session("s-missing").await.unwrap_err();
    assert!(matches!(err, CoordError::NotFound { .. }));
}

#[tokio::test]
async fn test_fail_and_retry_requeues_task() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Retryable", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();
    let task = engine
        .create_task(&session.identifier, "Flaky", Priority::Medium, vec![])
        .await
        .unwrap();

    engine.assign_task(&task.identifier, "worker-1").await.unwrap();
    engine.start_task(&task.identifier).await.unwrap();
    assert!(engine
        .fail_task(&task.identifier, "tool crashed")
        .await
        .unwrap());

    let agent = engine.get_agent("worker-1").await.unwrap().unwrap();
    assert_eq!(agent.tasks_failed, 1);
    assert!(agent.is_available());
    assert_eq!(agent.last_error.as_deref(), Some("tool crashed"));

    assert!(engine.retry_task(&task.identifier).await.unwrap());
    let stored = engine.get_task(&task.identifier).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Pending);
    assert_eq!(stored.retry_count, 1);
    assert!(stored.assigned_agent.is_none());

    // Retried task is handed out again.
    let next = engine.get_next_task_for_agent("worker-1").await.unwrap();
    assert_eq!(next.unwrap().identifier, task.identifier);
}

#[tokio::test]
async fn test_next_task_respects_priority_order() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    engine.register_agent("worker-2", "Worker Two").await.unwrap();
    let session = engine
        .create_session("Prioritized", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();

    let low = engine
        .create_task(&session.identifier, "Low", Priority::Low, vec![])
        .await
        .unwrap();
    let critical = engine
        .create_task(&session.identifier, "Critical", Priority::Critical, vec![])
        .await
        .unwrap();

    let first = engine
        .get_next_task_for_agent("worker-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.identifier, critical.identifier);

    let second = engine
        .get_next_task_for_agent("worker-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.identifier, low.identifier);

    // Busy agents get nothing; unknown agents are an error.
    assert!(engine
        .get_next_task_for_agent("worker-1")
        .await
        .unwrap()
        .is_none());
    assert!(engine.get_next_task_for_agent("ghost").await.is_err());
}

#[tokio::test]
async fn test_events_published_on_transitions() {
    let engine = engine();
    let mut events = engine.subscribe([channels::SESSION_EVENTS, channels::TASK_EVENTS]);

    let session = engine
        .create_session("Announced", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();
    engine
        .create_task(&session.identifier, "Loud", Priority::Medium, vec![])
        .await
        .unwrap();

    let created = events.recv().await.unwrap();
    assert_eq!(created.payload["action"], "session_created");
    let started = events.recv().await.unwrap();
    assert_eq!(started.payload["action"], "session_started");
    assert_eq!(started.payload["status"], "active");
    let task_created = events.recv().await.unwrap();
    assert_eq!(task_created.payload["action"], "task_created");
}

#[tokio::test]
async fn test_cancel_task_releases_agent() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Cancelled work", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();
    let task = engine
        .create_task(&session.identifier, "Doomed", Priority::Medium, vec![])
        .await
        .unwrap();

    engine.assign_task(&task.identifier, "worker-1").await.unwrap();
    assert!(engine
        .cancel_task(&task.identifier, Some("superseded"))
        .await
        .unwrap());

    let stored = engine.get_task(&task.identifier).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Cancelled);
    let agent = engine.get_agent("worker-1").await.unwrap().unwrap();
    assert!(agent.is_available());

    // Terminal states are immutable.
    assert!(!engine.start_task(&task.identifier).await.unwrap());
}

struct CannedExecutor {
    outcome: Result<serde_json::Value, String>,
}

#[async_trait::async_trait]
impl TaskExecutor for CannedExecutor {
    async fn execute(
        &self,
        _task: &crewline_core::Task,
    ) -> Result<serde_json::Value, ExecutorError> {
        self.outcome
            .clone()
            .map_err(ExecutorError::Failed)
    }
}

#[tokio::test]
async fn test_run_task_records_both_outcomes() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Executed", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();

    let good = engine
        .create_task(&session.identifier, "Good", Priority::Medium, vec![])
        .await
        .unwrap();
    engine.assign_task(&good.identifier, "worker-1").await.unwrap();
    let executor = CannedExecutor {
        outcome: Ok(json!({"artifact": "build.tar.gz"})),
    };
    assert!(run_task(&engine, &executor, &good).await.unwrap());
    let stored = engine.get_task(&good.identifier).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.result, Some(json!({"artifact": "build.tar.gz"})));

    let bad = engine
        .create_task(&session.identifier, "Bad", Priority::Medium, vec![])
        .await
        .unwrap();
    engine.assign_task(&bad.identifier, "worker-1").await.unwrap();
    let executor = CannedExecutor {
        outcome: Err("compiler exploded".to_string()),
    };
    assert!(run_task(&engine, &executor, &bad).await.unwrap());
    let stored = engine.get_task(&bad.identifier).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.error_details.as_deref(), Some("compiler exploded"));
}

#[tokio::test]
async fn test_restarted_coordinator_recovers_pending_tasks() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let first = Coordinator::new(
        store.clone(),
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryLockManager::new()),
        CoordinatorConfig::default(),
    );
    first.register_agent("worker-1", "Worker One").await.unwrap();
    let session = first
        .create_session("Durable", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    first.start_session(&session.identifier).await.unwrap();
    let task = first
        .create_task(&session.identifier, "Survives restart", Priority::Medium, vec![])
        .await
        .unwrap();
    drop(first);

    let second = Coordinator::new(
        store,
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryLockManager::new()),
        CoordinatorConfig::default(),
    );
    // A fresh coordinator's queue is empty until it recovers.
    assert!(second
        .get_next_task_for_agent("worker-1")
        .await
        .unwrap()
        .is_none());

    let recovered = second.recover().await.unwrap();
    assert_eq!(recovered, 1);

    let next = second
        .get_next_task_for_agent("worker-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.identifier, task.identifier);
}

#[tokio::test]
async fn test_recovery_resolves_interrupted_fanout() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let session = Session::new("s-recov", "Recovered", Priority::Medium);
    store.create_session(&session).await.unwrap();

    // A completed task whose fan-out never ran, and its stuck dependent.
    let mut done = Task::new("t-done", session.id, "Done before crash", Priority::Medium);
    done.start();
    done.complete(json!({"ok": true}));
    store.create_task(&done).await.unwrap();
    let waiting = Task::new("t-waiting", session.id, "Stuck dependent", Priority::Medium)
        .with_dependencies(vec!["t-done".to_string()]);
    store.create_task(&waiting).await.unwrap();

    let engine = Coordinator::new(
        store,
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryLockManager::new()),
        CoordinatorConfig::default(),
    );
    engine.register_agent("worker-1", "Worker One").await.unwrap();

    let recovered = engine.recover().await.unwrap();
    assert_eq!(recovered, 1);

    let unstuck = engine.get_task("t-waiting").await.unwrap().unwrap();
    assert_eq!(unstuck.status, TaskStatus::Pending);
    let next = engine
        .get_next_task_for_agent("worker-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.identifier, "t-waiting");

    // Re-running the scan finds nothing new.
    assert_eq!(engine.recover().await.unwrap(), 0);
}

struct FaultyReleaseLocks {
    inner: MemoryLockManager,
}

#[async_trait::async_trait]
impl LockManager for FaultyReleaseLocks {
    async fn acquire(&self, key: &str, ttl: Duration) -> CoordResult<Option<LockToken>> {
        self.inner.acquire(key, ttl).await
    }

    async fn release(&self, _key: &str, _token: &LockToken) -> CoordResult<bool> {
        Err(CoordError::LockUnavailable(
            "lock backend unreachable".to_string(),
        ))
    }

    async fn extend(&self, key: &str, token: &LockToken, ttl: Duration) -> CoordResult<bool> {
        self.inner.extend(key, token, ttl).await
    }
}

#[tokio::test]
async fn test_release_fault_does_not_lose_claim() {
    init_tracing();
    let engine = Coordinator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCache::new()),
        Arc::new(FaultyReleaseLocks {
            inner: MemoryLockManager::new(),
        }),
        CoordinatorConfig::default(),
    );
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Lock fault", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();
    let task = engine
        .create_task(&session.identifier, "Claimed", Priority::Medium, vec![])
        .await
        .unwrap();

    // The claim commits before the release fault and must survive it.
    let next = engine
        .get_next_task_for_agent("worker-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.identifier, task.identifier);

    let stored = engine.get_task(&task.identifier).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Assigned);
    let agent = engine.get_agent("worker-1").await.unwrap().unwrap();
    assert!(!agent.is_available());
    assert_eq!(agent.current_task.as_deref(), Some(task.identifier.as_str()));
}

#[tokio::test]
async fn test_lock_unavailable_surfaces_after_bounded_retries() {
    init_tracing();
    let locks = Arc::new(MemoryLockManager::new());
    let config = CoordinatorConfig {
        lock_retries: 2,
        lock_backoff_ms: 1,
        ..CoordinatorConfig::default()
    };
    let engine = Coordinator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCache::new()),
        locks.clone(),
        config,
    );
    engine.register_agent("worker-1", "Worker One").await.unwrap();

    let _held = locks
        .acquire("assign:ready", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    let err = engine.get_next_task_for_agent("worker-1").await.unwrap_err();
    assert!(matches!(err, CoordError::LockUnavailable(_)));
}

/// Store wrapper that completes a chosen dependency right before the next
/// task insert, reproducing a completion landing between dependency
/// validation and the insert.
struct RacingStore {
    inner: MemoryStore,
    complete_before_insert: tokio::sync::Mutex<Option<String>>,
}

#[async_trait::async_trait]
impl SessionRepo for RacingStore {
    async fn create_session(&self, session: &Session) -> CoordResult<()> {
        self.inner.create_session(session).await
    }

    async fn get_session(&self, identifier: &str) -> CoordResult<Option<Session>> {
        self.inner.get_session(identifier).await
    }

    async fn update_session(&self, session: &Session, expected: SessionStatus) -> CoordResult<()> {
        self.inner.update_session(session, expected).await
    }

    async fn list_sessions(&self) -> CoordResult<Vec<Session>> {
        self.inner.list_sessions().await
    }
}

#[async_trait::async_trait]
impl TaskRepo for RacingStore {
    async fn create_task(&self, task: &Task) -> CoordResult<()> {
        if let Some(dep) = self.complete_before_insert.lock().await.take() {
            if let Some(mut dep_task) = self.inner.get_task(&dep).await? {
                let expected = dep_task.status;
                dep_task.start();
                dep_task.complete(json!({"raced": true}));
                self.inner.update_task(&dep_task, expected).await?;
            }
        }
        self.inner.create_task(task).await
    }

    async fn get_task(&self, identifier: &str) -> CoordResult<Option<Task>> {
        self.inner.get_task(identifier).await
    }

    async fn update_task(&self, task: &Task, expected: TaskStatus) -> CoordResult<()> {
        self.inner.update_task(task, expected).await
    }

    async fn claim_task(&self, identifier: &str, agent_identifier: &str) -> CoordResult<Task> {
        self.inner.claim_task(identifier, agent_identifier).await
    }

    async fn list_session_tasks(&self, session_id: Uuid) -> CoordResult<Vec<Task>> {
        self.inner.list_session_tasks(session_id).await
    }

    async fn blocked_tasks_depending_on(&self, dep_identifier: &str) -> CoordResult<Vec<Task>> {
        self.inner.blocked_tasks_depending_on(dep_identifier).await
    }
}

#[async_trait::async_trait]
impl AgentRepo for RacingStore {
    async fn create_agent(&self, agent: &Agent) -> CoordResult<()> {
        self.inner.create_agent(agent).await
    }

    async fn get_agent(&self, identifier: &str) -> CoordResult<Option<Agent>> {
        self.inner.get_agent(identifier).await
    }

    async fn update_agent(&self, agent: &Agent, expected: AgentStatus) -> CoordResult<()> {
        self.inner.update_agent(agent, expected).await
    }

    async fn list_agents(&self) -> CoordResult<Vec<Agent>> {
        self.inner.list_agents().await
    }
}

#[tokio::test]
async fn test_dependency_completing_during_creation_still_unblocks() {
    init_tracing();
    let store = Arc::new(RacingStore {
        inner: MemoryStore::new(),
        complete_before_insert: tokio::sync::Mutex::new(None),
    });
    let engine = Coordinator::new(
        store.clone(),
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryLockManager::new()),
        CoordinatorConfig::default(),
    );
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Raced", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();
    let a = engine
        .create_task(&session.identifier, "A", Priority::Medium, vec![])
        .await
        .unwrap();

    // The dependency reaches Completed after validation reads it but
    // before the new task's insert lands.
    *store.complete_before_insert.lock().await = Some(a.identifier.clone());
    let b = engine
        .create_task(
            &session.identifier,
            "B",
            Priority::Medium,
            vec![a.identifier.clone()],
        )
        .await
        .unwrap();

    assert_eq!(b.status, TaskStatus::Pending);
    assert!(b.dependencies.is_empty());
    let next = engine
        .get_next_task_for_agent("worker-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.identifier, b.identifier);
}

#[tokio::test]
async fn test_agent_error_takes_worker_out_of_rotation() {
    let engine = engine();
    engine.register_agent("worker-1", "Worker One").await.unwrap();
    let session = engine
        .create_session("Fault handling", Priority::Medium, None, vec![], HashMap::new())
        .await
        .unwrap();
    engine.start_session(&session.identifier).await.unwrap();
    engine
        .create_task(&session.identifier, "Waiting", Priority::Medium, vec![])
        .await
        .unwrap();

    let mut events = engine.subscribe([channels::SYSTEM_EVENTS]);
    assert!(engine
        .report_agent_error("worker-1", "connection refused")
        .await
        .unwrap());

    let agent = engine.get_agent("worker-1").await.unwrap().unwrap();
    assert_eq!(agent.status, AgentStatus::Error);
    assert_eq!(agent.last_error.as_deref(), Some("connection refused"));

    // An errored worker gets no work handed out.
    assert!(engine
        .get_next_task_for_agent("worker-1")
        .await
        .unwrap()
        .is_none());

    let event = events.recv().await.unwrap();
    assert_eq!(event.payload["action"], "agent_error");
}

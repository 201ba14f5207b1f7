use crate::config::CoordinatorConfig;
use crate::ready_queue::{ReadyEntry, ReadyQueue};
use crate::resolver::DependencyResolver;
use crewline_core::{
    channels, Agent, CoordError, CoordResult, Priority, Session, Task, TaskStatus,
};
use crewline_store::Store;
use crewline_sync::{Cache, EventBus, LockManager, Subscription};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lock key serializing ready-queue assignment.
const ASSIGN_LOCK: &str = "assign:ready";

/// Completion roll-up for a session's tasks.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionProgress {
    /// Total tasks in the session.
    pub total: usize,
    /// Tasks in `Completed`.
    pub completed: usize,
    /// Tasks in `Failed`.
    pub failed: usize,
    /// Tasks in `InProgress`.
    pub in_progress: usize,
    /// `completed / total * 100`, 0.0 for an empty session.
    pub percentage: f64,
}

/// The coordination engine.
///
/// Composes the durable store, the cache, the lock manager, and the event
/// bus behind one API. Every mutation follows the same shape: read the
/// authoritative record from the store, validate the transition against
/// the guard table, write back with a conditional update, then invalidate
/// the cache and publish the event. Losing the conditional update is a
/// business conflict reported as `Ok(false)`, never an error.
pub struct Coordinator {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    locks: Arc<dyn LockManager>,
    bus: EventBus,
    ready: RwLock<ReadyQueue>,
    resolver: DependencyResolver,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Build an engine over the given backends.
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        locks: Arc<dyn LockManager>,
        config: CoordinatorConfig,
    ) -> Self {
        let bus = EventBus::new(config.bus_capacity);
        let resolver = DependencyResolver::new(store.clone());
        Self {
            store,
            cache,
            locks,
            bus,
            ready: RwLock::new(ReadyQueue::new()),
            resolver,
            config,
        }
    }

    /// Rebuild in-process scheduling state from the durable store.
    ///
    /// The ready queue lives in this process only, so a coordinator built
    /// over an existing store starts empty. This scan puts every Pending
    /// unassigned task back in the queue and re-runs dependency fan-out
    /// for every Completed task, which also repairs a crash that landed
    /// between a completion write and its fan-out. Idempotent; safe to
    /// run at any time. Returns the number of tasks made ready.
    pub async fn recover(&self) -> CoordResult<usize> {
        let mut ready_count = 0;
        for session in self.store.list_sessions().await? {
            for task in self.store.list_session_tasks(session.id).await? {
                match task.status {
                    TaskStatus::Pending if task.assigned_agent.is_none() => {
                        self.ready.write().await.push(ReadyEntry {
                            identifier: task.identifier.clone(),
                            priority: task.priority,
                            created_at: task.created_at,
                        });
                        ready_count += 1;
                    }
                    TaskStatus::Completed => {
                        let unblocked = self.resolver.resolve(&task.identifier).await?;
                        ready_count += unblocked.len();
                        self.enqueue_unblocked(unblocked, &task.identifier).await?;
                    }
                    _ => {}
                }
            }
        }
        info!(ready = ready_count, "recovery scan rebuilt ready state");
        Ok(ready_count)
    }

    /// Subscribe to engine events on the given channels.
    pub fn subscribe<I, S>(&self, channel_names: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bus.subscribe(channel_names)
    }

    // ---- sessions ----

    /// Create a session in `Planning` and announce it.
    pub async fn create_session(
        &self,
        name: &str,
        priority: Priority,
        description: Option<&str>,
        projects: Vec<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> CoordResult<Session> {
        let identifier = short_id("s");
        let mut session = Session::new(&identifier, name, priority)
            .with_projects(projects)
            .with_metadata(metadata);
        if let Some(description) = description {
            session = session.with_description(description);
        }
        self.store.create_session(&session).await?;
        self.cache_session(&session).await;
        self.bus.publish(
            channels::SESSION_EVENTS,
            json!({
                "action": "session_created",
                "session": identifier,
                "name": name,
                "priority": priority.to_string(),
            }),
        );
        info!(session = %identifier, name, "session created");
        Ok(session)
    }

    /// Move a session from `Planning` to `Active`.
    pub async fn start_session(&self, identifier: &str) -> CoordResult<bool> {
        self.apply_session(identifier, "session_started", |s| s.start())
            .await
            .map(|s| s.is_some())
    }

    /// Pause an active session, recording an optional reason.
    pub async fn pause_session(&self, identifier: &str, reason: Option<&str>) -> CoordResult<bool> {
        self.apply_session(identifier, "session_paused", |s| s.pause(reason))
            .await
            .map(|s| s.is_some())
    }

    /// Resume a paused session.
    pub async fn resume_session(&self, identifier: &str) -> CoordResult<bool> {
        self.apply_session(identifier, "session_resumed", |s| s.resume())
            .await
            .map(|s| s.is_some())
    }

    /// Complete a session. Unfinished tasks do not block completion but
    /// are logged.
    pub async fn complete_session(
        &self,
        identifier: &str,
        summary: Option<&str>,
    ) -> CoordResult<bool> {
        if let Some(session) = self.store.get_session(identifier).await? {
            let tasks = self.store.list_session_tasks(session.id).await?;
            let unfinished = tasks
                .iter()
                .filter(|t| !t.status.is_terminal() && t.status != TaskStatus::Failed)
                .count();
            if unfinished > 0 {
                warn!(session = %identifier, unfinished, "completing session with unfinished tasks");
            }
        }
        self.apply_session(identifier, "session_completed", |s| s.complete(summary))
            .await
            .map(|s| s.is_some())
    }

    /// Fail a session with a reason.
    pub async fn fail_session(&self, identifier: &str, reason: &str) -> CoordResult<bool> {
        self.apply_session(identifier, "session_failed", |s| s.fail(reason))
            .await
            .map(|s| s.is_some())
    }

    /// Cancel a session, recording an optional reason.
    pub async fn cancel_session(
        &self,
        identifier: &str,
        reason: Option<&str>,
    ) -> CoordResult<bool> {
        self.apply_session(identifier, "session_cancelled", |s| s.cancel(reason))
            .await
            .map(|s| s.is_some())
    }

    /// Archive a finished session.
    pub async fn archive_session(&self, identifier: &str) -> CoordResult<bool> {
        self.apply_session(identifier, "session_archived", |s| s.archive())
            .await
            .map(|s| s.is_some())
    }

    /// Read a session, cache first.
    pub async fn get_session(&self, identifier: &str) -> CoordResult<Option<Session>> {
        let key = session_key(identifier);
        if let Some(session) = self.cache_read::<Session>(&key).await {
            return Ok(Some(session));
        }
        match self.store.get_session(identifier).await? {
            Some(session) => {
                self.cache_session(&session).await;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// All sessions, unordered.
    pub async fn list_sessions(&self) -> CoordResult<Vec<Session>> {
        self.store.list_sessions().await
    }

    /// Completion roll-up for a session.
    pub async fn get_session_progress(&self, identifier: &str) -> CoordResult<SessionProgress> {
        let session = self
            .store
            .get_session(identifier)
            .await?
            .ok_or_else(|| CoordError::not_found("session", identifier))?;
        let tasks = self.store.list_session_tasks(session.id).await?;
        let total = tasks.len();
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let failed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        let in_progress = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .count();
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Ok(SessionProgress {
            total,
            completed,
            failed,
            in_progress,
            percentage,
        })
    }

    // ---- tasks ----

    /// Create a task under a session.
    ///
    /// Dependency identifiers must name existing tasks of the same
    /// session; a dangling reference is `NotFound`. Dependencies that are
    /// already completed are dropped up front, and a task whose remaining
    /// set is empty starts `Pending` and enters the ready queue.
    pub async fn create_task(
        &self,
        session_identifier: &str,
        title: &str,
        priority: Priority,
        dependencies: Vec<String>,
    ) -> CoordResult<Task> {
        let session = self
            .store
            .get_session(session_identifier)
            .await?
            .ok_or_else(|| CoordError::not_found("session", session_identifier))?;

        let mut open_deps = Vec::new();
        for dep in dependencies {
            let dep_task = self
                .store
                .get_task(&dep)
                .await?
                .ok_or_else(|| CoordError::not_found("task", dep.clone()))?;
            if dep_task.session_id != session.id {
                return Err(CoordError::not_found("task", dep));
            }
            if dep_task.status != TaskStatus::Completed {
                open_deps.push(dep);
            }
        }

        let identifier = short_id("t");
        let mut task = Task::new(&identifier, session.id, title, priority)
            .with_dependencies(open_deps);
        self.store.create_task(&task).await?;

        // A dependency can reach Completed between the validation read and
        // the insert; that completion's fan-out ran before this task
        // existed and will never fire again. Re-check after the insert and
        // run the fan-out for any dependency that finished in the window.
        if task.status == TaskStatus::Blocked {
            for dep in task.dependencies.clone() {
                match self.store.get_task(&dep).await? {
                    Some(dep_task) if dep_task.status == TaskStatus::Completed => {
                        let unblocked = self.resolver.resolve(&dep).await?;
                        self.enqueue_unblocked(unblocked, &dep).await?;
                    }
                    _ => {}
                }
            }
            if let Some(current) = self.store.get_task(&identifier).await? {
                task = current;
            }
        }

        self.cache_task(&task).await;
        if task.status == TaskStatus::Pending {
            self.ready.write().await.push(ReadyEntry {
                identifier: identifier.clone(),
                priority: task.priority,
                created_at: task.created_at,
            });
        }
        self.bus.publish(
            channels::TASK_EVENTS,
            json!({
                "action": "task_created",
                "task": identifier,
                "session": session_identifier,
                "status": task.status.to_string(),
                "priority": priority.to_string(),
            }),
        );
        info!(task = %identifier, session = %session_identifier, status = %task.status,
            "task created");
        Ok(task)
    }

    /// Assign a pending task to a specific agent.
    ///
    /// The claim is a single conditional update in the store; exactly one
    /// of N concurrent assigners wins and the rest get `Ok(false)`.
    pub async fn assign_task(
        &self,
        task_identifier: &str,
        agent_identifier: &str,
    ) -> CoordResult<bool> {
        let agent = self
            .store
            .get_agent(agent_identifier)
            .await?
            .ok_or_else(|| CoordError::not_found("agent", agent_identifier))?;
        if !agent.is_available() {
            warn!(agent = %agent_identifier, status = %agent.status,
                "agent not available for assignment");
            return Ok(false);
        }

        let task = match self.store.claim_task(task_identifier, agent_identifier).await {
            Ok(task) => task,
            Err(e) if e.is_conflict() => {
                debug!(task = %task_identifier, agent = %agent_identifier,
                    "lost assignment claim");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        self.ready.write().await.remove(task_identifier);
        self.invalidate(&task_key(task_identifier)).await;
        self.mark_agent_busy(agent_identifier, task_identifier).await?;
        self.bus.publish(
            channels::TASK_EVENTS,
            json!({
                "action": "task_assigned",
                "task": task_identifier,
                "agent": agent_identifier,
            }),
        );
        self.bus.publish(
            &channels::agent_commands(agent_identifier),
            json!({
                "action": "execute_task",
                "task": task_identifier,
                "title": task.title,
            }),
        );
        info!(task = %task_identifier, agent = %agent_identifier, "task assigned");
        Ok(true)
    }

    /// Pop the best ready task and claim it for an agent.
    ///
    /// The pop-then-claim window is serialized under the assignment lock;
    /// the claim itself remains the correctness backstop, so a stale queue
    /// entry is skipped rather than trusted.
    pub async fn get_next_task_for_agent(
        &self,
        agent_identifier: &str,
    ) -> CoordResult<Option<Task>> {
        let agent = self
            .store
            .get_agent(agent_identifier)
            .await?
            .ok_or_else(|| CoordError::not_found("agent", agent_identifier))?;
        if !agent.is_available() {
            debug!(agent = %agent_identifier, status = %agent.status,
                "agent not available, no task handed out");
            return Ok(None);
        }

        let token = self.acquire_assign_lock().await?;
        let claimed = self.claim_from_queue(agent_identifier).await;
        // The lock is advisory; a committed claim must survive a release
        // fault the same way it survives a publish fault.
        match self.locks.release(ASSIGN_LOCK, &token).await {
            Ok(true) => {}
            Ok(false) => warn!(key = ASSIGN_LOCK, "assignment lock expired before release"),
            Err(e) => warn!(key = ASSIGN_LOCK, error = %e, "assignment lock release failed"),
        }
        let claimed = claimed?;

        if let Some(task) = &claimed {
            self.invalidate(&task_key(&task.identifier)).await;
            self.mark_agent_busy(agent_identifier, &task.identifier).await?;
            self.bus.publish(
                channels::TASK_EVENTS,
                json!({
                    "action": "task_assigned",
                    "task": task.identifier,
                    "agent": agent_identifier,
                }),
            );
            self.bus.publish(
                &channels::agent_commands(agent_identifier),
                json!({
                    "action": "execute_task",
                    "task": task.identifier,
                    "title": task.title,
                }),
            );
            info!(task = %task.identifier, agent = %agent_identifier, "task handed out");
        }
        Ok(claimed)
    }

    /// Move a task to `InProgress`.
    pub async fn start_task(&self, identifier: &str) -> CoordResult<bool> {
        self.apply_task(identifier, "task_started", |t| t.start())
            .await
            .map(|t| t.is_some())
    }

    /// Complete a task: record the result, update the executing agent's
    /// metrics, and fan out to dependent tasks.
    ///
    /// Exactly-once: a second completion of the same task loses the
    /// conditional update, returns `Ok(false)`, and records no metrics.
    pub async fn complete_task(
        &self,
        identifier: &str,
        result: serde_json::Value,
    ) -> CoordResult<bool> {
        let updated = self
            .apply_task(identifier, "task_completed", |t| t.complete(result.clone()))
            .await?;
        let Some(task) = updated else {
            return Ok(false);
        };

        if let Some(agent_identifier) = &task.assigned_agent {
            let duration = task.duration_secs().unwrap_or(0.0);
            self.update_agent_with(agent_identifier, |a| {
                a.record_completion(duration);
                a.set_available();
            })
            .await?;
        }

        let unblocked = self.resolver.resolve(identifier).await?;
        self.enqueue_unblocked(unblocked, identifier).await?;
        Ok(true)
    }

    /// Fail a task with an error detail and update the executing agent's
    /// metrics.
    pub async fn fail_task(&self, identifier: &str, error: &str) -> CoordResult<bool> {
        let updated = self
            .apply_task(identifier, "task_failed", |t| t.fail(error))
            .await?;
        let Some(task) = updated else {
            return Ok(false);
        };

        if let Some(agent_identifier) = &task.assigned_agent {
            // A task failure is recorded against the agent's metrics but
            // does not take the worker out of rotation; worker-level
            // faults go through `report_agent_error`.
            self.update_agent_with(agent_identifier, |a| {
                a.record_failure(error);
                a.set_available();
            })
            .await?;
        }
        Ok(true)
    }

    /// Retry a failed task. It re-enters the ready queue, or `Blocked` if
    /// dependencies remain unmet.
    pub async fn retry_task(&self, identifier: &str) -> CoordResult<bool> {
        let updated = self
            .apply_task(identifier, "task_retried", |t| t.retry())
            .await?;
        let Some(task) = updated else {
            return Ok(false);
        };
        if task.status == TaskStatus::Pending {
            self.ready.write().await.push(ReadyEntry {
                identifier: task.identifier.clone(),
                priority: task.priority,
                created_at: task.created_at,
            });
        }
        Ok(true)
    }

    /// Cancel a task, releasing its agent if one holds it.
    pub async fn cancel_task(&self, identifier: &str, reason: Option<&str>) -> CoordResult<bool> {
        let updated = self
            .apply_task(identifier, "task_cancelled", |t| t.cancel(reason))
            .await?;
        let Some(task) = updated else {
            return Ok(false);
        };
        self.ready.write().await.remove(identifier);
        if let Some(agent_identifier) = &task.assigned_agent {
            self.update_agent_with(agent_identifier, |a| a.set_available())
                .await?;
        }
        Ok(true)
    }

    /// Move a running task to `UnderReview`.
    pub async fn submit_for_review(&self, identifier: &str) -> CoordResult<bool> {
        self.apply_task(identifier, "task_under_review", |t| t.submit_for_review())
            .await
            .map(|t| t.is_some())
    }

    /// Read a task, cache first.
    pub async fn get_task(&self, identifier: &str) -> CoordResult<Option<Task>> {
        let key = task_key(identifier);
        if let Some(task) = self.cache_read::<Task>(&key).await {
            return Ok(Some(task));
        }
        match self.store.get_task(identifier).await? {
            Some(task) => {
                self.cache_task(&task).await;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// All tasks of a session.
    pub async fn list_session_tasks(&self, session_identifier: &str) -> CoordResult<Vec<Task>> {
        let session = self
            .store
            .get_session(session_identifier)
            .await?
            .ok_or_else(|| CoordError::not_found("session", session_identifier))?;
        self.store.list_session_tasks(session.id).await
    }

    // ---- agents ----

    /// Register an agent and announce it on the system channel.
    pub async fn register_agent(&self, identifier: &str, name: &str) -> CoordResult<Agent> {
        let agent = Agent::new(identifier, name);
        self.store.create_agent(&agent).await?;
        self.bus.publish(
            channels::SYSTEM_EVENTS,
            json!({
                "action": "agent_registered",
                "agent": identifier,
                "name": name,
            }),
        );
        info!(agent = %identifier, name, "agent registered");
        Ok(agent)
    }

    /// Read an agent record.
    pub async fn get_agent(&self, identifier: &str) -> CoordResult<Option<Agent>> {
        self.store.get_agent(identifier).await
    }

    /// All agent records.
    pub async fn list_agents(&self) -> CoordResult<Vec<Agent>> {
        self.store.list_agents().await
    }

    /// Put an agent in the error state, announcing it on the system
    /// channel. Used for worker-level faults (crashed process, lost
    /// connection), not individual task failures.
    pub async fn report_agent_error(&self, identifier: &str, message: &str) -> CoordResult<bool> {
        let applied = self
            .update_agent_with(identifier, |a| a.set_error(message))
            .await?;
        if applied {
            self.bus.publish(
                channels::SYSTEM_EVENTS,
                json!({
                    "action": "agent_error",
                    "agent": identifier,
                    "error": message,
                }),
            );
            warn!(agent = %identifier, error = message, "agent reported in error state");
        }
        Ok(applied)
    }

    /// Take an agent out of rotation.
    pub async fn set_agent_offline(&self, identifier: &str) -> CoordResult<bool> {
        let applied = self
            .update_agent_with(identifier, |a| a.set_offline())
            .await?;
        if applied {
            self.bus.publish(
                channels::SYSTEM_EVENTS,
                json!({"action": "agent_offline", "agent": identifier}),
            );
        }
        Ok(applied)
    }

    // ---- internals ----

    /// Read, guard, conditionally write, invalidate, publish. The shape
    /// every session mutation shares. Returns the updated record, or
    /// `None` when the transition is rejected or lost to a concurrent
    /// writer.
    async fn apply_session<F>(
        &self,
        identifier: &str,
        action: &str,
        mutate: F,
    ) -> CoordResult<Option<Session>>
    where
        F: Fn(&mut Session),
    {
        for attempt in 0..2 {
            let current = self
                .store
                .get_session(identifier)
                .await?
                .ok_or_else(|| CoordError::not_found("session", identifier))?;
            let mut next = current.clone();
            mutate(&mut next);
            if next.status == current.status {
                warn!(session = %identifier, status = %current.status, action,
                    "session already in target status");
                return Ok(None);
            }
            if !current.status.can_transition_to(next.status) {
                warn!(session = %identifier, from = %current.status, to = %next.status,
                    "invalid session transition rejected");
                return Ok(None);
            }
            match self.store.update_session(&next, current.status).await {
                Ok(()) => {
                    self.invalidate(&session_key(identifier)).await;
                    self.bus.publish(
                        channels::SESSION_EVENTS,
                        json!({
                            "action": action,
                            "session": identifier,
                            "status": next.status.to_string(),
                        }),
                    );
                    info!(session = %identifier, status = %next.status, "session transition");
                    return Ok(Some(next));
                }
                Err(e) if e.is_conflict() && attempt == 0 => {
                    debug!(session = %identifier, "session update conflicted, re-reading");
                }
                Err(e) if e.is_conflict() => {
                    warn!(session = %identifier, action, "session update lost twice, giving up");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Task counterpart of [`Coordinator::apply_session`].
    async fn apply_task<F>(
        &self,
        identifier: &str,
        action: &str,
        mutate: F,
    ) -> CoordResult<Option<Task>>
    where
        F: Fn(&mut Task),
    {
        for attempt in 0..2 {
            let current = self
                .store
                .get_task(identifier)
                .await?
                .ok_or_else(|| CoordError::not_found("task", identifier))?;
            let mut next = current.clone();
            mutate(&mut next);
            if next.status == current.status {
                warn!(task = %identifier, status = %current.status, action,
                    "task already in target status");
                return Ok(None);
            }
            if !current.status.can_transition_to(next.status) {
                warn!(task = %identifier, from = %current.status, to = %next.status,
                    "invalid task transition rejected");
                return Ok(None);
            }
            match self.store.update_task(&next, current.status).await {
                Ok(()) => {
                    self.invalidate(&task_key(identifier)).await;
                    self.bus.publish(
                        channels::TASK_EVENTS,
                        json!({
                            "action": action,
                            "task": identifier,
                            "status": next.status.to_string(),
                        }),
                    );
                    info!(task = %identifier, status = %next.status, "task transition");
                    return Ok(Some(next));
                }
                Err(e) if e.is_conflict() && attempt == 0 => {
                    debug!(task = %identifier, "task update conflicted, re-reading");
                }
                Err(e) if e.is_conflict() => {
                    warn!(task = %identifier, action, "task update lost twice, giving up");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Read-modify-write an agent record with one retry on conflict.
    ///
    /// A missing agent is logged and swallowed: metric updates ride on
    /// task operations that already committed, and must not unwind them.
    async fn update_agent_with<F>(&self, identifier: &str, mutate: F) -> CoordResult<bool>
    where
        F: Fn(&mut Agent),
    {
        for attempt in 0..2 {
            let Some(current) = self.store.get_agent(identifier).await? else {
                warn!(agent = %identifier, "agent record missing during update");
                return Ok(false);
            };
            let mut next = current.clone();
            mutate(&mut next);
            match self.store.update_agent(&next, current.status).await {
                Ok(()) => return Ok(true),
                Err(e) if e.is_conflict() && attempt == 0 => {
                    debug!(agent = %identifier, "agent update conflicted, re-reading");
                }
                Err(e) if e.is_conflict() => {
                    warn!(agent = %identifier, "agent update lost twice, skipping");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Queue and announce tasks the resolver just moved to Pending.
    async fn enqueue_unblocked(
        &self,
        unblocked: Vec<String>,
        completed_identifier: &str,
    ) -> CoordResult<()> {
        for ready_identifier in unblocked {
            self.invalidate(&task_key(&ready_identifier)).await;
            if let Some(ready_task) = self.store.get_task(&ready_identifier).await? {
                self.ready.write().await.push(ReadyEntry {
                    identifier: ready_identifier.clone(),
                    priority: ready_task.priority,
                    created_at: ready_task.created_at,
                });
            }
            self.bus.publish(
                channels::TASK_EVENTS,
                json!({
                    "action": "task_unblocked",
                    "task": ready_identifier,
                    "completed_dependency": completed_identifier,
                }),
            );
        }
        Ok(())
    }

    async fn mark_agent_busy(
        &self,
        agent_identifier: &str,
        task_identifier: &str,
    ) -> CoordResult<()> {
        self.update_agent_with(agent_identifier, |a| a.set_busy(task_identifier))
            .await?;
        Ok(())
    }

    async fn acquire_assign_lock(&self) -> CoordResult<crewline_sync::LockToken> {
        for attempt in 0..self.config.lock_retries {
            if let Some(token) = self.locks.acquire(ASSIGN_LOCK, self.config.lock_ttl()).await? {
                return Ok(token);
            }
            if attempt + 1 < self.config.lock_retries {
                tokio::time::sleep(self.config.lock_backoff() * (attempt + 1)).await;
            }
        }
        Err(CoordError::LockUnavailable(ASSIGN_LOCK.to_string()))
    }

    /// Pop-and-claim loop under the assignment lock. Stale entries, tasks
    /// claimed out-of-band, and deleted tasks are skipped.
    async fn claim_from_queue(&self, agent_identifier: &str) -> CoordResult<Option<Task>> {
        loop {
            let Some(entry) = self.ready.write().await.pop() else {
                return Ok(None);
            };
            match self.store.claim_task(&entry.identifier, agent_identifier).await {
                Ok(task) => return Ok(Some(task)),
                Err(e) if e.is_conflict() => {
                    debug!(task = %entry.identifier, "skipping stale ready-queue entry");
                }
                Err(CoordError::NotFound { .. }) => {
                    debug!(task = %entry.identifier, "skipping vanished ready-queue entry");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn cache_session(&self, session: &Session) {
        match serde_json::to_value(session) {
            Ok(value) => {
                let key = session_key(&session.identifier);
                if let Err(e) = self
                    .cache
                    .set(&key, value, self.config.session_cache_ttl())
                    .await
                {
                    warn!(key, error = %e, "cache set failed");
                }
            }
            Err(e) => warn!(session = %session.identifier, error = %e,
                "session cache serialization failed"),
        }
    }

    async fn cache_task(&self, task: &Task) {
        match serde_json::to_value(task) {
            Ok(value) => {
                let key = task_key(&task.identifier);
                if let Err(e) = self
                    .cache
                    .set(&key, value, self.config.task_cache_ttl())
                    .await
                {
                    warn!(key, error = %e, "cache set failed");
                }
            }
            Err(e) => warn!(task = %task.identifier, error = %e,
                "task cache serialization failed"),
        }
    }

    /// Cache read that degrades to a miss on any infrastructure or decode
    /// fault.
    async fn cache_read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key, error = %e, "dropping undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, falling back to store");
                None
            }
        }
    }

    async fn invalidate(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            warn!(key, error = %e, "cache invalidation failed");
        }
    }
}

fn session_key(identifier: &str) -> String {
    format!("session:{identifier}")
}

fn task_key(identifier: &str) -> String {
    format!("task:{identifier}")
}

fn short_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &uuid[..8])
}

use crewline_core::{CoordResult, TaskStatus};
use crewline_store::Store;
use std::sync::Arc;
use tracing::{debug, info};

/// Unblocks tasks whose dependencies have completed.
///
/// Pull-based fan-out: on every completion it scans the currently Blocked
/// tasks rather than maintaining a reverse-dependency index. Resolution is
/// idempotent: a dependency already removed, or a task another resolver
/// advanced first, is skipped, so re-running the scan after a crash
/// between a completion write and its fan-out is safe.
pub struct DependencyResolver {
    store: Arc<dyn Store>,
}

impl DependencyResolver {
    /// Create a resolver over the shared store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Propagate the completion of `completed_identifier`: shrink the
    /// dependency set of every Blocked task listing it, and move tasks
    /// whose set became empty to Pending. Returns the identifiers that
    /// became Pending.
    pub async fn resolve(&self, completed_identifier: &str) -> CoordResult<Vec<String>> {
        let blocked = self
            .store
            .blocked_tasks_depending_on(completed_identifier)
            .await?;
        let mut unblocked = Vec::new();

        for mut task in blocked {
            if !task.remove_dependency(completed_identifier) {
                continue;
            }
            let now_ready = task.dependencies.is_empty();
            if now_ready {
                task.status = TaskStatus::Pending;
            }
            match self.store.update_task(&task, TaskStatus::Blocked).await {
                Ok(()) => {
                    if now_ready {
                        info!(task = %task.identifier, dependency = completed_identifier,
                            "task unblocked");
                        unblocked.push(task.identifier);
                    } else {
                        debug!(task = %task.identifier, dependency = completed_identifier,
                            remaining = task.dependencies.len(), "dependency satisfied");
                    }
                }
                Err(e) if e.is_conflict() => {
                    // A concurrent resolver or cancellation advanced this
                    // task first; the state it reached stands.
                    debug!(task = %task.identifier, "skipping concurrently modified task");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(unblocked)
    }
}

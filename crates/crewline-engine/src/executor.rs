use crate::engine::Coordinator;
use async_trait::async_trait;
use crewline_core::{CoordResult, Task};
use thiserror::Error;
use tracing::{error, info};

/// Failure raised by an executor run.
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// The work itself failed; the message is recorded on the task.
    #[error("{0}")]
    Failed(String),
    /// The run exceeded its time budget.
    #[error("timed out after {0} seconds")]
    TimedOut(u64),
}

/// Boundary between coordination and actual work.
///
/// The engine never executes anything itself; it hands a claimed task to
/// an executor and records whatever comes back. Implementations run
/// subprocess tools, remote workers, or, in tests, canned outcomes.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task to completion, returning its result payload.
    async fn execute(&self, task: &Task) -> Result<serde_json::Value, ExecutorError>;
}

/// Drive one claimed task through its execution lifecycle.
///
/// Starts the task, runs the executor, and records the outcome. A failed
/// run is always recorded via the failure path; the error itself is not
/// surfaced because the coordination write succeeded.
pub async fn run_task(
    coordinator: &Coordinator,
    executor: &dyn TaskExecutor,
    task: &Task,
) -> CoordResult<bool> {
    if !coordinator.start_task(&task.identifier).await? {
        return Ok(false);
    }
    match executor.execute(task).await {
        Ok(result) => {
            info!(task = %task.identifier, "execution succeeded");
            coordinator.complete_task(&task.identifier, result).await
        }
        Err(e) => {
            error!(task = %task.identifier, error = %e, "execution failed");
            coordinator
                .fail_task(&task.identifier, &e.to_string())
                .await
        }
    }
}

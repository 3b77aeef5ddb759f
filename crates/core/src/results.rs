//! Result types for workspace operations
//!
//! Plain values returned by [`crate::workspace_manager::WorkspaceManager`]
//! so the CLI can render them however it likes.

use std::collections::HashMap;
use std::fmt;

use crate::execution::{CancelToken, ExecutionReport, Executor, JobObserver, ProcessSpec, Runner};
use crate::output::OutputMode;
use crate::pipeline::{TaskDef, TaskName};
use crate::types::{MonospaceError, MonospaceResult};

/// A pipeline entry as listed by `tasks`.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub def: TaskDef,
}

/// A task that will run, with the runnable dependencies it waits for.
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub name: String,
    pub spec: ProcessSpec,
    pub output_mode: Option<OutputMode>,
    pub depends_on: Vec<String>,
}

/// A resolved task left out of the run.
#[derive(Debug, Clone)]
pub struct SkippedTask {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for SkippedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} will be skipped: {}", self.name, self.reason)
    }
}

/// Everything needed to execute a resolved task list. Jobs are in
/// dependency order.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub jobs: Vec<PlannedJob>,
    pub skipped: Vec<SkippedTask>,
}

impl RunPlan {
    pub fn into_executor(self, concurrency: usize, cancel: CancelToken) -> MonospaceResult<Executor> {
        let mut executor = Executor::new(concurrency).with_cancel_token(cancel);
        let mut ids = HashMap::new();
        for job in self.jobs {
            let id = executor.add_job(job.name.clone(), Runner::Process(job.spec));
            executor.set_output_mode(id, job.output_mode);
            for dep in &job.depends_on {
                let dep_id = ids.get(dep).copied().ok_or_else(|| {
                    MonospaceError::Execution(format!(
                        "job '{}' is planned before its dependency '{}'",
                        job.name, dep
                    ))
                })?;
                executor.add_dependency(id, dep_id)?;
            }
            ids.insert(job.name, id);
        }
        Ok(executor)
    }

    pub async fn execute(
        self,
        concurrency: usize,
        observer: &mut dyn JobObserver,
        cancel: CancelToken,
    ) -> MonospaceResult<ExecutionReport> {
        let executor = self.into_executor(concurrency, cancel)?;
        Ok(executor.execute(observer).await)
    }
}

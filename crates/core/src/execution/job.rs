//! Jobs: the executable nodes of the execution DAG.

use std::fmt;
use std::time::{Duration, Instant};

use crate::execution::command::ProcessSpec;
use crate::output::OutputMode;
use crate::types::MonospaceResult;

/// Index of a job inside one executor.
pub type JobId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Which stream a chunk of job output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// An in-process runner. The returned string is the job's output.
pub type FunctionRunner = Box<dyn FnOnce() -> (String, MonospaceResult<()>) + Send + 'static>;

/// How a job does its work.
pub enum Runner {
    Process(ProcessSpec),
    Function(FunctionRunner),
}

impl Runner {
    pub fn function<F>(f: F) -> Self
    where
        F: FnOnce() -> (String, MonospaceResult<()>) + Send + 'static,
    {
        Runner::Function(Box::new(f))
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runner::Process(spec) => f.debug_tuple("Process").field(spec).finish(),
            Runner::Function(_) => f.write_str("Function"),
        }
    }
}

/// Observable record of a job. Runners are held by the executor, so this
/// is a plain value the observers can inspect.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    /// Per-job override of the execution's output mode.
    pub output_mode: Option<OutputMode>,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub duration: Option<Duration>,
    pub error: Option<String>,
}

impl Job {
    pub(crate) fn new(id: JobId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: JobState::Pending,
            output_mode: None,
            started_at: None,
            finished_at: None,
            duration: None,
            error: None,
        }
    }
}

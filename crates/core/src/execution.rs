//! Task execution module
//!
//! This module turns resolved tasks into runnable jobs and executes them as a
//! DAG with bounded parallelism, reporting progress to a [`JobObserver`].

pub mod command;
pub mod executor;
pub mod job;
pub mod runner;

pub use command::ProcessSpec;
pub use executor::{
    default_concurrency, CancelToken, ExecutionReport, Executor, JobObserver, NoopObserver,
};
pub use job::{FunctionRunner, Job, JobId, JobState, Runner, Stream};
pub use runner::RunnerFactory;

//! Bounded-parallelism DAG executor
//!
//! Jobs run as tokio tasks. A semaphore with `N` permits gates admission and
//! the scheduler keeps each permit until it has processed the job's
//! completion, so the number of `Running` jobs never exceeds `N`. Workers
//! report back over a single channel; every observer call happens on the
//! scheduler, one at a time.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::execution::command::ProcessSpec;
use crate::execution::job::{Job, JobId, JobState, Runner, Stream};
use crate::types::{MonospaceError, MonospaceResult};

const READ_CHUNK: usize = 8 * 1024;

/// Hooks fired by the executor. Calls are serial and ordered:
/// `on_jobs_start` first, `on_jobs_done` last.
pub trait JobObserver: Send {
    fn on_jobs_start(&mut self, _jobs: &[Job]) {}
    fn on_job_start(&mut self, _job: &Job) {}
    fn on_job_output(&mut self, _job: &Job, _stream: Stream, _chunk: &[u8]) {}
    fn on_job_done(&mut self, _job: &Job) {}
    fn on_job_skipped(&mut self, _job: &Job) {}
    fn on_cancelled(&mut self) {}
    fn on_jobs_done(&mut self, _report: &ExecutionReport) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl JobObserver for NoopObserver {}

/// Shared handle used to request cancellation of an execution.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Final state of every job plus the errors of the failed ones.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub jobs: Vec<Job>,
    pub errors: BTreeMap<JobId, String>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl ExecutionReport {
    fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobState::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(JobState::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobState::Skipped)
    }

    /// Jobs whose runner was actually invoked.
    pub fn ran(&self) -> usize {
        self.succeeded() + self.failed()
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.jobs.iter().all(|j| j.state == JobState::Succeeded)
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

enum Event {
    Output {
        id: JobId,
        stream: Stream,
        chunk: Vec<u8>,
    },
    Done {
        id: JobId,
        result: Result<(), String>,
    },
}

pub struct Executor {
    jobs: Vec<Job>,
    runners: Vec<Option<Runner>>,
    deps: Vec<BTreeSet<JobId>>,
    dependents: Vec<BTreeSet<JobId>>,
    concurrency: usize,
    cancel: CancelToken,
}

impl Executor {
    /// An executor running at most `concurrency` jobs at a time; `0` means
    /// the available parallelism of the machine.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = if concurrency == 0 {
            default_concurrency()
        } else {
            concurrency
        };
        Self {
            jobs: Vec::new(),
            runners: Vec::new(),
            deps: Vec::new(),
            dependents: Vec::new(),
            concurrency,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn add_job(&mut self, name: impl Into<String>, runner: Runner) -> JobId {
        let id = self.jobs.len();
        self.jobs.push(Job::new(id, name));
        self.runners.push(Some(runner));
        self.deps.push(BTreeSet::new());
        self.dependents.push(BTreeSet::new());
        id
    }

    pub fn set_output_mode(&mut self, id: JobId, mode: Option<crate::output::OutputMode>) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.output_mode = mode;
        }
    }

    /// Make `job` wait for `depends_on` to succeed.
    pub fn add_dependency(&mut self, job: JobId, depends_on: JobId) -> MonospaceResult<()> {
        let (Some(a), Some(b)) = (self.jobs.get(job), self.jobs.get(depends_on)) else {
            return Err(MonospaceError::Execution(format!(
                "unknown job id in dependency {} -> {}",
                job, depends_on
            )));
        };
        if job == depends_on || self.depends_transitively(depends_on, job) {
            return Err(MonospaceError::Execution(format!(
                "dependency '{}' -> '{}' would introduce a cycle",
                a.name, b.name
            )));
        }
        self.deps[job].insert(depends_on);
        self.dependents[depends_on].insert(job);
        Ok(())
    }

    fn depends_transitively(&self, from: JobId, target: JobId) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.deps[id].iter().copied());
            }
        }
        false
    }

    /// Run every job to completion and report their final states.
    pub async fn execute(mut self, observer: &mut dyn JobObserver) -> ExecutionReport {
        let started = Instant::now();
        observer.on_jobs_start(&self.jobs);
        info!(
            jobs = self.jobs.len(),
            concurrency = self.concurrency,
            "starting execution"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut permits: HashMap<JobId, OwnedSemaphorePermit> = HashMap::new();
        let mut ready: VecDeque<JobId> = (0..self.jobs.len())
            .filter(|id| self.deps[*id].is_empty())
            .collect();
        let mut cancel_rx = self.cancel.subscribe();
        let mut watching_cancel = true;
        let mut cancelled = false;

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                cancelled = true;
                self.abort_pending(&mut ready, observer);
            }

            while !cancelled {
                let Some(&id) = ready.front() else { break };
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    break;
                };
                ready.pop_front();
                permits.insert(id, permit);
                self.start(id, &tx, observer);
            }

            if permits.is_empty() {
                break;
            }

            tokio::select! {
                Some(event) = rx.recv() => match event {
                    Event::Output { id, stream, chunk } => {
                        observer.on_job_output(&self.jobs[id], stream, &chunk);
                    }
                    Event::Done { id, result } => {
                        permits.remove(&id);
                        self.finish(id, result, &mut ready, observer);
                    }
                },
                changed = cancel_rx.changed(), if watching_cancel && !cancelled => {
                    if changed.is_err() {
                        watching_cancel = false;
                    } else if *cancel_rx.borrow() {
                        cancelled = true;
                        self.abort_pending(&mut ready, observer);
                    }
                }
            }
        }

        // Anything still pending is unreachable: one of its dependencies
        // never got to run.
        for id in 0..self.jobs.len() {
            if self.jobs[id].state == JobState::Pending {
                self.skip(id, observer);
            }
        }

        let errors = self
            .jobs
            .iter()
            .filter(|j| j.state == JobState::Failed)
            .map(|j| (j.id, j.error.clone().unwrap_or_default()))
            .collect();
        let report = ExecutionReport {
            jobs: self.jobs,
            errors,
            elapsed: started.elapsed(),
            cancelled,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            cancelled,
            "execution finished"
        );
        observer.on_jobs_done(&report);
        report
    }

    fn start(&mut self, id: JobId, tx: &mpsc::UnboundedSender<Event>, observer: &mut dyn JobObserver) {
        let job = &mut self.jobs[id];
        job.state = JobState::Running;
        job.started_at = Some(Instant::now());
        debug!(job = %job.name, "job started");
        observer.on_job_start(job);

        let runner = self.runners[id].take();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = match runner {
                Some(Runner::Process(spec)) => run_process(id, spec, &tx).await,
                Some(Runner::Function(f)) => run_function(id, f, &tx).await,
                None => Err("job has no runner".to_string()),
            };
            let _ = tx.send(Event::Done { id, result });
        });
    }

    fn finish(
        &mut self,
        id: JobId,
        result: Result<(), String>,
        ready: &mut VecDeque<JobId>,
        observer: &mut dyn JobObserver,
    ) {
        let now = Instant::now();
        let job = &mut self.jobs[id];
        job.finished_at = Some(now);
        job.duration = job.started_at.map(|s| now.duration_since(s));
        match result {
            Ok(()) => job.state = JobState::Succeeded,
            Err(e) => {
                warn!(job = %job.name, error = %e, "job failed");
                job.state = JobState::Failed;
                job.error = Some(e);
            }
        }
        debug!(job = %job.name, state = %job.state, "job done");
        observer.on_job_done(&self.jobs[id]);

        if self.jobs[id].state == JobState::Succeeded {
            for &next in &self.dependents[id] {
                let unblocked = self.jobs[next].state == JobState::Pending
                    && self.deps[next]
                        .iter()
                        .all(|d| self.jobs[*d].state == JobState::Succeeded);
                if unblocked {
                    ready.push_back(next);
                }
            }
        } else {
            self.skip_dependents(id, observer);
        }
    }

    fn skip_dependents(&mut self, id: JobId, observer: &mut dyn JobObserver) {
        let mut queue: VecDeque<JobId> = self.dependents[id].iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if self.jobs[next].state != JobState::Pending {
                continue;
            }
            self.skip(next, observer);
            queue.extend(self.dependents[next].iter().copied());
        }
    }

    fn skip(&mut self, id: JobId, observer: &mut dyn JobObserver) {
        let job = &mut self.jobs[id];
        job.state = JobState::Skipped;
        self.runners[id] = None;
        debug!(job = %job.name, "job skipped");
        observer.on_job_skipped(job);
    }

    fn abort_pending(&mut self, ready: &mut VecDeque<JobId>, observer: &mut dyn JobObserver) {
        info!("cancellation requested; no new jobs will start");
        observer.on_cancelled();
        ready.clear();
        for id in 0..self.jobs.len() {
            if self.jobs[id].state == JobState::Pending {
                self.skip(id, observer);
            }
        }
    }
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

async fn run_process(
    id: JobId,
    spec: ProcessSpec,
    tx: &mpsc::UnboundedSender<Event>,
) -> Result<(), String> {
    let mut child = spec
        .command()
        .spawn()
        .map_err(|e| format!("failed to start '{}': {}", spec.program, e))?;

    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(pump(id, Stream::Stdout, out, tx.clone())));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(pump(id, Stream::Stderr, err, tx.clone())));

    let status = child
        .wait()
        .await
        .map_err(|e| format!("failed to wait for '{}': {}", spec.program, e))?;

    // All output is routed before the job is reported done.
    for reader in [stdout, stderr].into_iter().flatten() {
        let _ = reader.await;
    }

    if status.success() {
        return Ok(());
    }
    Err(match status.code() {
        Some(code) => format!("command '{}' exited with code {}", spec.display(), code),
        None => format!("command '{}' was terminated by a signal", spec.display()),
    })
}

async fn pump<R>(id: JobId, stream: Stream, mut reader: R, tx: mpsc::UnboundedSender<Event>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = buf[..n].to_vec();
                if tx.send(Event::Output { id, stream, chunk }).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(job = id, error = %e, "reading job output failed");
                break;
            }
        }
    }
}

async fn run_function(
    id: JobId,
    f: crate::execution::job::FunctionRunner,
    tx: &mpsc::UnboundedSender<Event>,
) -> Result<(), String> {
    let (output, result) = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| format!("function runner panicked: {}", e))?;
    if !output.is_empty() {
        let _ = tx.send(Event::Output {
            id,
            stream: Stream::Stdout,
            chunk: output.into_bytes(),
        });
    }
    result.map_err(|e| e.to_string())
}

//! Output multiplexer
//!
//! Routes job output to a writer according to the execution's
//! [`OutputMode`] (or a per-job override) and prints the common header and
//! summary lines around every execution.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

use colored::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::execution::{ExecutionReport, Job, JobId, JobObserver, JobState, Stream};
use crate::types::MonospaceError;
use crate::ui::palette_color;

const GLYPH_PENDING: &str = "⏳";
const GLYPH_RUNNING: &str = "🏃";
const GLYPH_SUCCEEDED: &str = "✔";
const GLYPH_FAILED: &str = "✘";
const GLYPH_SKIPPED: &str = "⏭";
const INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Nothing besides the header and summary.
    None,
    /// One block per job, printed when it completes.
    #[default]
    Grouped,
    /// Every line, prefixed with the job name, as it is produced.
    Interleaved,
    /// A live table of job states.
    StatusOnly,
    /// Like interleaved, restricted to stderr and error messages.
    ErrorsOnly,
}

impl OutputMode {
    pub const ALL: [OutputMode; 5] = [
        OutputMode::None,
        OutputMode::Grouped,
        OutputMode::Interleaved,
        OutputMode::StatusOnly,
        OutputMode::ErrorsOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::None => "none",
            OutputMode::Grouped => "grouped",
            OutputMode::Interleaved => "interleaved",
            OutputMode::StatusOnly => "status-only",
            OutputMode::ErrorsOnly => "errors-only",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = MonospaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                MonospaceError::Config(format!(
                    "unknown output mode '{}' (expected one of: {})",
                    s,
                    OutputMode::ALL.map(OutputMode::as_str).join(", ")
                ))
            })
    }
}

/// Human-friendly duration: `850ms`, `1.23s`, `2m05s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// The `Tasks: ...` summary line.
pub fn summary_line(report: &ExecutionReport) -> String {
    let indicator = if report.is_success() {
        GLYPH_SUCCEEDED
    } else {
        GLYPH_FAILED
    };
    let mut line = format!(
        "Tasks: {} {} succeeded / {} failed / {} total",
        indicator,
        report.succeeded(),
        report.failed(),
        report.ran()
    );
    if report.skipped() > 0 {
        line.push_str(&format!(" ({} skipped)", report.skipped()));
    }
    line
}

/// A [`JobObserver`] writing job output to `out`.
pub struct Multiplexer {
    mode: OutputMode,
    enhanced: bool,
    out: Box<dyn Write + Send>,
    jobs: Vec<Job>,
    captured: HashMap<JobId, Vec<u8>>,
    at_line_start: HashMap<JobId, bool>,
    drawn_rows: usize,
    aborted: bool,
}

impl Multiplexer {
    pub fn new(mode: OutputMode, enhanced: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            mode,
            enhanced,
            out,
            jobs: Vec::new(),
            captured: HashMap::new(),
            at_line_start: HashMap::new(),
            drawn_rows: 0,
            aborted: false,
        }
    }

    pub fn stdout(mode: OutputMode, enhanced: bool) -> Self {
        Self::new(mode, enhanced, Box::new(std::io::stdout()))
    }

    /// Mode applied to a single job. A per-job `status-only` falls back to
    /// `grouped`: the live table only makes sense for the whole execution.
    fn mode_for(&self, job: &Job) -> OutputMode {
        match job.output_mode {
            Some(OutputMode::StatusOnly) => OutputMode::Grouped,
            Some(mode) => mode,
            None => self.mode,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(e) = self.out.write_all(bytes) {
            debug!(error = %e, "failed to write job output");
        }
    }

    fn write_line(&mut self, line: &str) {
        self.write(line.as_bytes());
        self.write(b"\n");
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.enhanced {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.enhanced {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn prefix(&self, id: JobId) -> String {
        let name = format!("{}: ", self.jobs[id].name);
        self.paint(&name, palette_color(id))
    }

    /// Write `chunk` with the job prefix at the start of every line.
    fn write_prefixed(&mut self, id: JobId, chunk: &[u8]) {
        self.drawn_rows = 0;
        let prefix = self.prefix(id);
        let mut at_start = self.at_line_start.get(&id).copied().unwrap_or(true);
        let mut rest = chunk;
        while !rest.is_empty() {
            if at_start {
                self.write(prefix.as_bytes());
            }
            match rest.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.write(&rest[..=pos]);
                    rest = &rest[pos + 1..];
                    at_start = true;
                }
                None => {
                    self.write(rest);
                    rest = &[];
                    at_start = false;
                }
            }
        }
        self.at_line_start.insert(id, at_start);
    }

    /// Terminate a partially written line of `id`.
    fn close_line(&mut self, id: JobId) {
        if self.at_line_start.insert(id, true) == Some(false) {
            self.write(b"\n");
        }
    }

    fn glyph(&self, state: JobState) -> String {
        match state {
            JobState::Pending => GLYPH_PENDING.to_string(),
            JobState::Skipped => self.paint(GLYPH_SKIPPED, Color::BrightBlack),
            JobState::Running => GLYPH_RUNNING.to_string(),
            JobState::Succeeded => self.paint(GLYPH_SUCCEEDED, Color::Green),
            JobState::Failed => self.paint(GLYPH_FAILED, Color::Red),
        }
    }

    fn print_block(&mut self, job: &Job) {
        self.drawn_rows = 0;
        let duration = format_duration(job.duration.unwrap_or_default());
        let status = format!(
            "{} {} {} in {}",
            self.glyph(job.state),
            self.bold(&job.name),
            job.state,
            duration
        );
        self.write_line(&status);

        let captured = self.captured.remove(&job.id).unwrap_or_default();
        let text = String::from_utf8_lossy(&captured);
        let error = job.error.as_deref().map(|e| self.paint(e, Color::Red));
        for line in text.lines().chain(error.iter().flat_map(|e| e.lines())) {
            self.write_line(&format!("{}{}", INDENT, line));
        }
    }

    /// Redraw the status table in place. Without enhanced rendering only
    /// the job that changed is printed. Anything written below the table
    /// since the last draw resets `drawn_rows`, so the table is drawn anew
    /// underneath it.
    fn draw_status(&mut self, changed: JobId) {
        if !self.enhanced {
            let job = &self.jobs[changed];
            let row = format!("{} {} {}", self.glyph(job.state), job.name, job.state);
            self.write_line(&row);
            return;
        }
        if self.drawn_rows > 0 {
            self.write(format!("\x1b[{}A", self.drawn_rows).as_bytes());
        }
        let rows: Vec<String> = self
            .jobs
            .iter()
            .map(|job| {
                format!(
                    "\x1b[2K{} {} {}",
                    self.glyph(job.state),
                    self.paint(&job.name, palette_color(job.id)),
                    job.state.to_string().bright_black()
                )
            })
            .collect();
        for row in &rows {
            self.write_line(row);
        }
        self.drawn_rows = rows.len();
    }

    fn update(&mut self, job: &Job) {
        if let Some(slot) = self.jobs.get_mut(job.id) {
            slot.clone_from(job);
        }
    }
}

impl JobObserver for Multiplexer {
    fn on_jobs_start(&mut self, jobs: &[Job]) {
        self.jobs = jobs.to_vec();
        self.write_line(&format!("Starting {} tasks...", jobs.len()));
        if self.mode == OutputMode::StatusOnly && self.enhanced && !jobs.is_empty() {
            self.draw_status(0);
        }
    }

    fn on_job_start(&mut self, job: &Job) {
        self.update(job);
        if self.mode == OutputMode::StatusOnly {
            self.draw_status(job.id);
        }
    }

    fn on_job_output(&mut self, job: &Job, stream: Stream, chunk: &[u8]) {
        match self.mode_for(job) {
            OutputMode::Grouped => self
                .captured
                .entry(job.id)
                .or_default()
                .extend_from_slice(chunk),
            OutputMode::Interleaved => self.write_prefixed(job.id, chunk),
            OutputMode::ErrorsOnly if stream == Stream::Stderr => {
                self.write_prefixed(job.id, chunk)
            }
            _ => {}
        }
    }

    fn on_job_done(&mut self, job: &Job) {
        self.update(job);
        match self.mode_for(job) {
            OutputMode::Grouped => self.print_block(job),
            OutputMode::Interleaved => self.close_line(job.id),
            OutputMode::ErrorsOnly => {
                self.close_line(job.id);
                if let Some(error) = &job.error {
                    let line = format!("{}\n", self.paint(error, Color::Red));
                    self.write_prefixed(job.id, line.as_bytes());
                }
            }
            OutputMode::StatusOnly | OutputMode::None => {}
        }
        if self.mode == OutputMode::StatusOnly {
            self.draw_status(job.id);
        }
    }

    fn on_job_skipped(&mut self, job: &Job) {
        self.update(job);
        if self.mode == OutputMode::StatusOnly {
            self.draw_status(job.id);
        }
    }

    fn on_cancelled(&mut self) {
        if !self.aborted {
            self.aborted = true;
            let message = self.paint("User Aborted", Color::Red);
            self.write_line(&message);
        }
    }

    fn on_jobs_done(&mut self, report: &ExecutionReport) {
        let summary = summary_line(report);
        self.write_line(&summary);
        self.write_line(&format!("total time: {}", format_duration(report.elapsed)));
        if let Err(e) = self.out.flush() {
            debug!(error = %e, "failed to flush output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Executor, Runner};
    use crate::types::MonospaceError;
    use std::sync::{Arc, Mutex};

    /// Clonable in-memory writer.
    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn job(id: JobId, name: &str) -> Job {
        Job::new(id, name)
    }

    #[test]
    fn parses_modes() {
        assert_eq!("errors-only".parse::<OutputMode>().unwrap(), OutputMode::ErrorsOnly);
        assert_eq!(OutputMode::default(), OutputMode::Grouped);
        let err = "loud".parse::<OutputMode>().unwrap_err();
        assert!(err.to_string().contains("none, grouped, interleaved, status-only, errors-only"));
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.23s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }

    #[test]
    fn interleaved_prefixes_every_line() {
        let buffer = Buffer::default();
        let mut mux = Multiplexer::new(OutputMode::Interleaved, false, Box::new(buffer.clone()));
        let a = job(0, "apps/a#build");
        let b = job(1, "apps/b#build");
        mux.on_jobs_start(&[a.clone(), b.clone()]);
        mux.on_job_output(&a, Stream::Stdout, b"one\ntw");
        mux.on_job_output(&b, Stream::Stderr, b"x\n");
        mux.on_job_output(&a, Stream::Stdout, b"o\n");
        mux.on_job_output(&a, Stream::Stdout, b"partial");
        mux.on_job_done(&a);

        assert_eq!(
            buffer.text(),
            "Starting 2 tasks...\n\
             apps/a#build: one\n\
             apps/a#build: twapps/b#build: x\n\
             o\n\
             apps/a#build: partial\n"
        );
    }

    #[test]
    fn errors_only_forwards_stderr_and_errors() {
        let buffer = Buffer::default();
        let mut mux = Multiplexer::new(OutputMode::ErrorsOnly, false, Box::new(buffer.clone()));
        let mut a = job(0, "a");
        mux.on_jobs_start(&[a.clone()]);
        mux.on_job_output(&a, Stream::Stdout, b"noise\n");
        mux.on_job_output(&a, Stream::Stderr, b"warn\n");
        a.state = JobState::Failed;
        a.error = Some("exit 1".to_string());
        mux.on_job_done(&a);

        assert_eq!(buffer.text(), "Starting 1 tasks...\na: warn\na: exit 1\n");
    }

    #[test]
    fn per_job_override_wins() {
        let buffer = Buffer::default();
        let mut mux = Multiplexer::new(OutputMode::None, false, Box::new(buffer.clone()));
        let mut a = job(0, "a");
        a.output_mode = Some(OutputMode::Interleaved);
        let b = job(1, "b");
        mux.on_jobs_start(&[a.clone(), b.clone()]);
        mux.on_job_output(&a, Stream::Stdout, b"shown\n");
        mux.on_job_output(&b, Stream::Stdout, b"hidden\n");
        assert_eq!(buffer.text(), "Starting 2 tasks...\na: shown\n");
    }

    #[tokio::test]
    async fn grouped_prints_one_block_per_job_in_completion_order() {
        let buffer = Buffer::default();
        let mut mux = Multiplexer::new(OutputMode::Grouped, false, Box::new(buffer.clone()));

        let mut executor = Executor::new(1);
        let test = executor.add_job("test", Runner::function(|| ("ran tests\n".to_string(), Ok(()))));
        let build = executor.add_job(
            "build",
            Runner::function(|| {
                (
                    "compiling\n".to_string(),
                    Err(MonospaceError::Execution("compile error".to_string())),
                )
            }),
        );
        let deploy = executor.add_job("deploy", Runner::function(|| (String::new(), Ok(()))));
        executor.add_dependency(build, test).unwrap();
        executor.add_dependency(deploy, build).unwrap();

        let report = executor.execute(&mut mux).await;
        let text = buffer.text();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Starting 3 tasks...");
        assert!(lines[1].starts_with("✔ test succeeded in "));
        assert_eq!(lines[2], "    ran tests");
        assert!(lines[3].starts_with("✘ build failed in "));
        assert_eq!(lines[4], "    compiling");
        assert_eq!(lines[5], "    Execution error: compile error");
        assert_eq!(lines[6], "Tasks: ✘ 1 succeeded / 1 failed / 2 total (1 skipped)");
        assert!(lines[7].starts_with("total time: "));
        assert_eq!(lines.len(), 8);
        assert_eq!(summary_line(&report), lines[6]);
    }

    #[test]
    fn cancellation_message_prints_once() {
        let buffer = Buffer::default();
        let mut mux = Multiplexer::new(OutputMode::Grouped, false, Box::new(buffer.clone()));
        mux.on_cancelled();
        mux.on_cancelled();
        assert_eq!(buffer.text(), "User Aborted\n");
    }

    #[test]
    fn status_only_without_enhanced_rendering_logs_changes() {
        let buffer = Buffer::default();
        let mut mux = Multiplexer::new(OutputMode::StatusOnly, false, Box::new(buffer.clone()));
        let mut a = job(0, "a");
        mux.on_jobs_start(&[a.clone()]);
        a.state = JobState::Running;
        mux.on_job_start(&a);
        mux.on_job_output(&a, Stream::Stdout, b"hidden\n");
        a.state = JobState::Succeeded;
        mux.on_job_done(&a);
        assert_eq!(
            buffer.text(),
            "Starting 1 tasks...\n🏃 a running\n✔ a succeeded\n"
        );
    }

    #[test]
    fn status_only_table_ignores_per_job_modes() {
        let buffer = Buffer::default();
        let mut mux = Multiplexer::new(OutputMode::StatusOnly, false, Box::new(buffer.clone()));
        let mut a = job(0, "a");
        a.output_mode = Some(OutputMode::None);
        let mut b = job(1, "b");
        b.output_mode = Some(OutputMode::Interleaved);
        mux.on_jobs_start(&[a.clone(), b.clone()]);
        a.state = JobState::Running;
        mux.on_job_start(&a);
        mux.on_job_output(&a, Stream::Stdout, b"hidden\n");
        a.state = JobState::Succeeded;
        mux.on_job_done(&a);
        b.state = JobState::Skipped;
        mux.on_job_skipped(&b);
        assert_eq!(
            buffer.text(),
            "Starting 2 tasks...\n🏃 a running\n✔ a succeeded\n⏭ b skipped\n"
        );
    }

    #[test]
    fn enhanced_status_table_redraws_in_place() {
        let buffer = Buffer::default();
        let mut mux = Multiplexer::new(OutputMode::StatusOnly, true, Box::new(buffer.clone()));
        let mut a = job(0, "a");
        let mut b = job(1, "b");
        mux.on_jobs_start(&[a.clone(), b.clone()]);
        a.state = JobState::Running;
        mux.on_job_start(&a);
        a.state = JobState::Failed;
        mux.on_job_done(&a);
        b.state = JobState::Skipped;
        mux.on_job_skipped(&b);

        let text = buffer.text();
        assert!(text.starts_with("Starting 2 tasks...\n\x1b[2K"));
        // The first draw has nothing to move over; each later one does.
        assert_eq!(text.matches("\x1b[2A").count(), 3);
        assert_eq!(text.matches("\x1b[2K").count(), 8);

        let last = text.rsplit("\x1b[2A").next().unwrap_or_default();
        let rows: Vec<&str> = last.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains(GLYPH_FAILED) && rows[0].contains("failed"));
        assert!(rows[1].contains(GLYPH_SKIPPED) && rows[1].contains("skipped"));
        assert!(!last.contains(GLYPH_PENDING));
    }

    #[test]
    fn grouped_override_prints_above_a_fresh_table() {
        let buffer = Buffer::default();
        let mut mux = Multiplexer::new(OutputMode::StatusOnly, true, Box::new(buffer.clone()));
        let mut a = job(0, "a");
        a.output_mode = Some(OutputMode::Grouped);
        mux.on_jobs_start(&[a.clone()]);
        a.state = JobState::Running;
        mux.on_job_start(&a);
        mux.on_job_output(&a, Stream::Stdout, b"built\n");
        a.state = JobState::Succeeded;
        mux.on_job_done(&a);

        let text = buffer.text();
        // Only the start redraw moves the cursor; the block resets the table.
        assert_eq!(text.matches("\x1b[1A").count(), 1);
        let block = text.find("    built\n").unwrap();
        let last_row = text.rfind("\x1b[2K").unwrap();
        assert!(block < last_row);
        assert!(text[last_row..].contains("succeeded"));
    }
}

pub mod exec;
pub mod graph;
pub mod run;
pub mod state;
pub mod tasks;

use monospace_core::execution::{CancelToken, ExecutionReport};
use monospace_core::output::OutputMode;
use monospace_core::ui;
use tracing::debug;

/// Flags shared by `run` and `exec`.
pub struct ExecutionOptions {
    pub filters: Vec<String>,
    pub concurrency: usize,
    pub output_mode: Option<OutputMode>,
}

/// A token cancelled by the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => token.cancel(),
            Err(e) => debug!(error = %e, "cannot listen for Ctrl-C"),
        }
    });
    cancel
}

/// Final status line of an execution.
pub fn report_outcome(report: &ExecutionReport) -> bool {
    if report.is_success() {
        ui::success("All tasks completed successfully");
    } else if report.cancelled {
        ui::error("Execution was cancelled");
    } else {
        ui::error(format!(
            "{} failed, {} skipped",
            report.failed(),
            report.skipped()
        ));
    }
    report.is_success()
}

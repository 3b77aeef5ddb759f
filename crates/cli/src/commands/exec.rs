use anyhow::Result;
use monospace_core::output::Multiplexer;
use monospace_core::ui::Terminal;
use monospace_core::workspace_manager::WorkspaceManager;

use crate::commands::{cancel_on_ctrl_c, report_outcome, ExecutionOptions};

pub async fn execute(
    manager: &WorkspaceManager,
    command: &[String],
    options: ExecutionOptions,
    terminal: Terminal,
) -> Result<bool> {
    let mode = manager.output_mode(options.output_mode);
    let mut output = Multiplexer::stdout(mode, terminal.enhanced());
    let report = manager
        .exec(
            command,
            &options.filters,
            options.concurrency,
            &mut output,
            cancel_on_ctrl_c(),
        )
        .await?;
    Ok(report_outcome(&report))
}

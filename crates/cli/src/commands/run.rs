use anyhow::Result;
use colored::*;
use monospace_core::output::Multiplexer;
use monospace_core::results::RunPlan;
use monospace_core::ui::{self, Terminal};
use monospace_core::workspace_manager::WorkspaceManager;

use crate::commands::{cancel_on_ctrl_c, report_outcome, ExecutionOptions};

pub async fn execute(
    manager: &WorkspaceManager,
    tasks: &[String],
    options: ExecutionOptions,
    dry_run: bool,
    terminal: Terminal,
) -> Result<bool> {
    let list = manager.resolve(tasks, &options.filters)?;
    let plan = manager.plan(&list)?;
    for skipped in &plan.skipped {
        ui::warning(skipped.to_string());
    }
    if dry_run {
        print_plan(&plan);
        return Ok(true);
    }

    let mode = manager.output_mode(options.output_mode);
    let mut output = Multiplexer::stdout(mode, terminal.enhanced());
    let report = plan
        .execute(options.concurrency, &mut output, cancel_on_ctrl_c())
        .await?;
    Ok(report_outcome(&report))
}

fn print_plan(plan: &RunPlan) {
    println!("{}", "Execution plan".bold().underline());
    for job in &plan.jobs {
        println!("{}", job.name.blue().bold());
        println!("  {} {}", "run:".dimmed(), job.spec.display());
        println!("  {} {}", "in:".dimmed(), job.spec.cwd.display());
        if !job.depends_on.is_empty() {
            println!("  {} {}", "after:".dimmed(), job.depends_on.join(", "));
        }
    }
}

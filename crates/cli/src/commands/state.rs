use anyhow::Result;
use colored::*;
use monospace_core::state::RestoreIssue;
use monospace_core::ui::{self, get_project_color, Interactivity, StdinPrompter};
use monospace_core::workspace_manager::WorkspaceManager;

use crate::StateCommands;

pub fn execute(
    manager: &WorkspaceManager,
    command: StateCommands,
    interactivity: Interactivity,
) -> Result<bool> {
    let state = manager.state();
    match command {
        StateCommands::Pin { name } => {
            let revisions = state.pin(&name, &manager.registry)?;
            ui::success(format!("Pinned '{}' ({} repositories)", name, revisions.len()));
        }
        StateCommands::Unpin { name } => {
            state.unpin(&name)?;
            ui::success(format!("Removed pinned state '{}'", name));
        }
        StateCommands::List => {
            let states = state.list()?;
            println!("{}", "Pinned states".bold().underline());
            if states.is_empty() {
                println!("  {}", "No pinned states".dimmed());
            }
            for (name, revisions) in states {
                println!("{}", name.blue().bold());
                for entry in revisions {
                    println!(
                        "  {} {}",
                        entry.project.color(get_project_color(&entry.project)),
                        entry.rev.dimmed()
                    );
                }
            }
        }
        StateCommands::Restore { name } => {
            let mut prompter = StdinPrompter::new(interactivity);
            let report = state.restore(&name, &manager.registry, &mut prompter)?;

            for (issue, projects) in &report.skipped {
                let reason = match issue {
                    RestoreIssue::Unclean => "unclean worktree",
                    RestoreIssue::Unknown => "unknown project",
                    RestoreIssue::NotGit => "not a git repository",
                };
                ui::warning(format!("Skipped ({}): {}", reason, projects.join(", ")));
            }
            for (project, error) in &report.failed {
                ui::warning(format!("Failed to restore {}: {}", project, error));
            }
            if !report.is_success() {
                ui::error(format!("Restore of '{}' finished with failures", name));
                return Ok(false);
            }
            ui::success(format!(
                "Restored '{}' ({} repositories)",
                name,
                report.restored.len()
            ));
        }
    }
    Ok(true)
}

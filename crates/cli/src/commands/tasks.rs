use std::io::Write;

use anyhow::{Context, Result};
use colored::*;
use monospace_core::lexer;
use monospace_core::pipeline::TaskName;
use monospace_core::projects::ROOT_PROJECT;
use monospace_core::ui::{self, get_project_color};
use monospace_core::workspace_manager::WorkspaceManager;

use crate::TasksCommands;

const DEFAULT_EDITOR: &str = "vi";

pub fn list(
    manager: &WorkspaceManager,
    filters: &[String],
    details: bool,
    full_project_names: bool,
) -> Result<bool> {
    let tasks = manager.list_tasks(filters)?;
    println!("{}", "Tasks".bold().underline());

    if tasks.is_empty() {
        println!("  {}", "No tasks found".dimmed());
        return Ok(true);
    }

    for info in &tasks {
        let label = display_name(manager, &info.name, full_project_names);
        let colored_label = if info.name.is_wildcard() {
            label.bold()
        } else {
            label.color(get_project_color(&info.name.project)).bold()
        };
        if info.def.description.is_empty() {
            println!("{}", colored_label);
        } else {
            println!("{} {}", colored_label, info.def.description.dimmed());
        }

        if !details {
            continue;
        }
        let cmd = if info.def.cmd.is_empty() {
            "(package.json script)".to_string()
        } else {
            lexer::join(&info.def.cmd)
        };
        println!("  {} {}", "cmd:".dimmed(), cmd);
        if !info.def.depends_on.is_empty() {
            println!("  {} {}", "depends on:".dimmed(), info.def.depends_on.join(", "));
        }
        if let Some(mode) = info.def.output_mode {
            println!("  {} {}", "output:".dimmed(), mode);
        }
        if info.def.persistent {
            println!("  {} {}", "persistent:".dimmed(), "yes".yellow());
        }
        for (key, value) in &info.def.env {
            println!("  {} {}={}", "env:".dimmed(), key, value);
        }
        if !info.def.inputs.is_empty() {
            println!("  {} {}", "inputs:".dimmed(), info.def.inputs.join(", "));
        }
        if !info.def.outputs.is_empty() {
            println!("  {} {}", "outputs:".dimmed(), info.def.outputs.join(", "));
        }
        if info.def.cache {
            println!("  {} {}", "cache:".dimmed(), "yes");
        }
    }

    Ok(true)
}

/// `project#task`, with the project's alias unless full names are asked for.
fn display_name(manager: &WorkspaceManager, name: &TaskName, full: bool) -> String {
    if full || name.is_wildcard() || name.project == ROOT_PROJECT {
        return name.to_string();
    }
    match manager.registry.alias_of(&name.project) {
        Some(alias) => format!("{}#{}", alias, name.task),
        None => name.to_string(),
    }
}

pub fn execute(manager: &mut WorkspaceManager, command: TasksCommands) -> Result<bool> {
    match command {
        TasksCommands::Remove { tasks } => {
            let removed = manager.remove_tasks(&tasks)?;
            ui::success(format!("Removed {}", removed.join(", ")));
        }
        TasksCommands::Import { scripts } => {
            let imported = manager.import_tasks(&scripts)?;
            if imported.is_empty() {
                ui::success("No new scripts to import");
            } else {
                ui::success(format!("Imported {}", imported.join(", ")));
            }
        }
        TasksCommands::Edit { tasks } => edit(manager, &tasks)?,
    }
    Ok(true)
}

fn edit(manager: &mut WorkspaceManager, tasks: &[String]) -> Result<()> {
    let document = manager.edit_document(tasks)?;
    let mut file = tempfile::Builder::new()
        .prefix("monospace-tasks-")
        .suffix(".yml")
        .tempfile()?;
    file.write_all(document.as_bytes())?;
    file.flush()?;

    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| DEFAULT_EDITOR.to_string());
    let mut argv = lexer::lex_lenient(&editor);
    if argv.is_empty() {
        argv.push(DEFAULT_EDITOR.to_string());
    }

    let status = std::process::Command::new(&argv[0])
        .args(&argv[1..])
        .arg(file.path())
        .status()
        .with_context(|| format!("failed to launch editor '{}'", editor))?;
    if !status.success() {
        anyhow::bail!("editor '{}' exited with {}", editor, status);
    }

    let edited = std::fs::read_to_string(file.path())?;
    if edited == document {
        ui::success("No changes");
        return Ok(());
    }
    manager
        .apply_edit(tasks, &edited)
        .context("edited tasks are invalid; nothing was saved")?;
    ui::success("Tasks updated");
    Ok(())
}

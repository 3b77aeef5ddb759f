use anyhow::Result;
use monospace_core::workspace_manager::WorkspaceManager;

pub fn execute(manager: &WorkspaceManager, tasks: &[String], filters: &[String]) -> Result<bool> {
    let dot = manager
        .graph(tasks, filters)
        .map_err(|e| anyhow::anyhow!("Failed to build task graph: {}", e))?;
    print!("{}", dot);
    Ok(true)
}

//! Runner factory
//!
//! Decides how a resolved task is executed: its own `cmd` when present,
//! otherwise the matching `package.json` script through the project's
//! package manager.

use std::path::Path;

use tracing::debug;

use crate::configs::package_json::PackageJson;
use crate::execution::command::ProcessSpec;
use crate::package_manager::{self, PackageManager};
use crate::pipeline::Task;
use crate::projects::{Project, ProjectRegistry, ROOT_PROJECT};
use crate::types::{MonospaceError, MonospaceResult};

pub const PROJECT_ENV: &str = "MONOSPACE_PROJECT";
pub const TASK_ENV: &str = "MONOSPACE_TASK";

pub struct RunnerFactory<'a> {
    root: &'a Path,
    registry: &'a ProjectRegistry,
    js_package_manager: Option<&'a str>,
}

impl<'a> RunnerFactory<'a> {
    pub fn new(root: &'a Path, registry: &'a ProjectRegistry, js_package_manager: &'a str) -> Self {
        Self {
            root,
            registry,
            js_package_manager: Some(js_package_manager).filter(|s| !s.trim().is_empty()),
        }
    }

    fn project(&self, name: &str) -> MonospaceResult<Project> {
        if name == ROOT_PROJECT {
            return Ok(Project::root());
        }
        self.registry
            .get_by_name(name)
            .cloned()
            .ok_or_else(|| MonospaceError::Runner(format!("unknown project '{}'", name)))
    }

    /// The subprocess running `task`, or a `Runner` error when it has
    /// nothing to run.
    pub fn build(&self, task: &Task) -> MonospaceResult<ProcessSpec> {
        let project = self.project(&task.name.project)?;
        let dir = project.dir(self.root);

        let argv = if !task.def.cmd.is_empty() {
            task.def.cmd.clone()
        } else {
            let manifest = PackageJson::read_from_dir(&dir)?
                .filter(|m| m.has_script(&task.name.task))
                .ok_or_else(|| {
                    MonospaceError::Runner(format!(
                        "task '{}' has no cmd and no matching package.json script",
                        task.name
                    ))
                })?;
            let pm = self.package_manager(&manifest, &dir).map_err(|e| {
                MonospaceError::Runner(format!("task '{}': {}", task.name, e))
            })?;
            debug!(task = %task.name, package_manager = %pm, "running package.json script");
            pm.run_script(&task.name.task)
        };

        Ok(ProcessSpec::new(&argv, &dir)?
            .with_envs(&task.def.env)
            .with_env(PROJECT_ENV, task.name.project.as_str())
            .with_env(TASK_ENV, task.name.task.as_str()))
    }

    /// Subprocess for an ad-hoc command run inside `project`.
    pub fn build_exec(&self, project: &Project, argv: &[String]) -> MonospaceResult<ProcessSpec> {
        Ok(ProcessSpec::new(argv, &project.dir(self.root))?
            .with_env(PROJECT_ENV, project.name.as_str()))
    }

    fn package_manager(&self, manifest: &PackageJson, dir: &Path) -> MonospaceResult<PackageManager> {
        let search: Vec<&Path> = if dir == self.root {
            vec![dir]
        } else {
            vec![dir, self.root]
        };
        package_manager::select(
            manifest.package_manager.as_deref(),
            self.js_package_manager,
            &search,
        )
    }
}

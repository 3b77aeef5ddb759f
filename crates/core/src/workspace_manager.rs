//! High-level workspace management interface
//!
//! This module provides the [`WorkspaceManager`], the explicit context object
//! every command works through. It owns the loaded configuration, the
//! project registry and the standardized pipeline, and exposes the
//! operations behind `run`, `exec`, `tasks`, `graph` and `state`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use monospace_core::execution::{CancelToken, NoopObserver};
//! use monospace_core::workspace_manager::{RunOptions, WorkspaceManager, WorkspaceManagerConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> monospace_core::types::MonospaceResult<()> {
//! let manager = WorkspaceManager::new(WorkspaceManagerConfig {
//!     workspace_root: PathBuf::from("."),
//! })?;
//!
//! let options = RunOptions {
//!     tasks: vec!["build".to_string()],
//!     ..RunOptions::default()
//! };
//! let report = manager.run(&options, &mut NoopObserver, CancelToken::new()).await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::configs::monospace::{find_root, load_monospace_config, save_monospace_config, MonospaceConfig};
use crate::configs::package_json::PackageJson;
use crate::configs::tasks::{parse_tasks_config, TaskConfig};
use crate::execution::{CancelToken, ExecutionReport, Executor, JobObserver, Runner, RunnerFactory};
use crate::git::SystemGit;
use crate::graph;
use crate::output::OutputMode;
use crate::pipeline::{split_task_key, Pipeline, TaskDef, TaskName, WILDCARD};
use crate::projects::{Project, ProjectRegistry, ROOT_PROJECT};
use crate::resolver::{filter_projects, Resolver, TaskList};
use crate::results::{PlannedJob, RunPlan, SkippedTask, TaskInfo};
use crate::state::StatePinner;
use crate::types::{MonospaceError, MonospaceResult};

/// Configuration for initializing a workspace manager
pub struct WorkspaceManagerConfig {
    pub workspace_root: PathBuf,
}

/// Parameters of a `run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub tasks: Vec<String>,
    pub filters: Vec<String>,
    /// `0` means the available parallelism.
    pub concurrency: usize,
}

/// High-level workspace manager that encapsulates all workspace operations
pub struct WorkspaceManager {
    pub root: PathBuf,
    pub config: MonospaceConfig,
    pub registry: ProjectRegistry,
    pub pipeline: Pipeline,
    state: StatePinner<SystemGit>,
}

impl WorkspaceManager {
    /// Load the workspace rooted at `workspace_root`.
    pub fn new(config: WorkspaceManagerConfig) -> MonospaceResult<Self> {
        let root = config.workspace_root;
        let config = load_monospace_config(&root)?;
        Self::from_config(root, config)
    }

    /// Load the workspace containing `start`, walking up the directory tree.
    pub fn discover(start: &Path) -> MonospaceResult<Self> {
        let workspace_root = find_root(start).ok_or_else(|| {
            MonospaceError::Config(format!(
                "no .monospace/monospace.yml found in '{}' or any parent directory",
                start.display()
            ))
        })?;
        Self::new(WorkspaceManagerConfig { workspace_root })
    }

    pub fn from_config(root: PathBuf, config: MonospaceConfig) -> MonospaceResult<Self> {
        let registry = ProjectRegistry::from_maps(&config.projects, &config.projects_aliases)
            .map_err(|e| MonospaceError::Config(e.to_string()))?;
        let pipeline = Pipeline::standardize(&config.pipeline, &registry)?;
        let state = StatePinner::new(&root, SystemGit);
        Ok(Self {
            root,
            config,
            registry,
            pipeline,
            state,
        })
    }

    /// Validate and persist the in-memory registry and pipeline.
    pub fn save(&mut self) -> MonospaceResult<()> {
        self.pipeline.validate()?;
        self.config.projects = self.registry.to_project_map();
        self.config.projects_aliases = self.registry.aliases().clone();
        self.config.pipeline = self.pipeline.to_config_map();
        save_monospace_config(&self.root, &self.config)?;
        info!(root = %self.root.display(), "saved workspace config");
        Ok(())
    }

    /// Output mode for an execution: the flag, then the configured
    /// preference, then `grouped`.
    pub fn output_mode(&self, flag: Option<OutputMode>) -> OutputMode {
        flag.or(self.config.preferred_output_mode)
            .unwrap_or_default()
    }

    pub fn filter_projects(&self, filters: &[String]) -> MonospaceResult<Vec<Project>> {
        filter_projects(&self.registry, filters, true)
    }

    /// Resolve requested tasks under a project filter.
    pub fn resolve(&self, tasks: &[String], filters: &[String]) -> MonospaceResult<TaskList> {
        if tasks.is_empty() {
            return Err(MonospaceError::Resolution("no task requested".to_string()));
        }
        self.pipeline.validate()?;
        let projects = self.filter_projects(filters)?;
        Resolver::new(&self.pipeline, &self.registry, &self.root).resolve(tasks, &projects)
    }

    /// Build runners for a resolved list.
    ///
    /// Tasks without a runner are skipped with a warning; whoever depended
    /// on them waits for their dependencies instead.
    pub fn plan(&self, list: &TaskList) -> MonospaceResult<RunPlan> {
        let factory = RunnerFactory::new(&self.root, &self.registry, &self.config.js_package_manager);
        let mut plan = RunPlan::default();
        // Runnable dependencies of every task seen so far; for a skipped task
        // these are what its dependents inherit.
        let mut runnable_deps: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut runnable: BTreeSet<String> = BTreeSet::new();

        for task in list.topological_order() {
            let name = task.name.to_string();
            let mut deps = BTreeSet::new();
            for dep in list.dependencies_of(&name) {
                if runnable.contains(dep) {
                    deps.insert(dep.clone());
                } else if let Some(inherited) = runnable_deps.get(dep) {
                    deps.extend(inherited.iter().cloned());
                }
            }

            match factory.build(task) {
                Ok(spec) => {
                    plan.jobs.push(PlannedJob {
                        name: name.clone(),
                        spec,
                        output_mode: task.def.output_mode,
                        depends_on: deps.iter().cloned().collect(),
                    });
                    runnable.insert(name.clone());
                }
                Err(MonospaceError::Runner(reason)) => {
                    warn!(task = %name, %reason, "skipping task without runner");
                    plan.skipped.push(SkippedTask {
                        name: name.clone(),
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
            runnable_deps.insert(name, deps);
        }

        if plan.jobs.is_empty() {
            return Err(MonospaceError::Runner(
                "none of the selected tasks can be run".to_string(),
            ));
        }
        Ok(plan)
    }

    /// Resolve, plan and execute `options.tasks`.
    pub async fn run(
        &self,
        options: &RunOptions,
        observer: &mut dyn JobObserver,
        cancel: CancelToken,
    ) -> MonospaceResult<ExecutionReport> {
        let list = self.resolve(&options.tasks, &options.filters)?;
        self.plan(&list)?
            .execute(options.concurrency, observer, cancel)
            .await
    }

    /// Run an ad-hoc command in every filtered project.
    pub async fn exec(
        &self,
        argv: &[String],
        filters: &[String],
        concurrency: usize,
        observer: &mut dyn JobObserver,
        cancel: CancelToken,
    ) -> MonospaceResult<ExecutionReport> {
        let factory = RunnerFactory::new(&self.root, &self.registry, &self.config.js_package_manager);
        let projects = self.filter_projects(filters)?;
        if projects.is_empty() {
            return Err(MonospaceError::Resolution(
                "no project matches the filter".to_string(),
            ));
        }

        let mut executor = Executor::new(concurrency).with_cancel_token(cancel);
        for project in &projects {
            let spec = factory.build_exec(project, argv)?;
            executor.add_job(project.name.clone(), Runner::Process(spec));
        }
        Ok(executor.execute(observer).await)
    }

    /// DOT description of the resolved tasks.
    pub fn graph(&self, tasks: &[String], filters: &[String]) -> MonospaceResult<String> {
        let list = self.resolve(tasks, filters)?;
        Ok(graph::to_dot(&list))
    }

    /// Pipeline entries applying to the filtered projects. Without filters
    /// every entry is listed.
    pub fn list_tasks(&self, filters: &[String]) -> MonospaceResult<Vec<TaskInfo>> {
        let selected: Option<BTreeSet<String>> = if filters.is_empty() {
            None
        } else {
            Some(
                self.filter_projects(filters)?
                    .into_iter()
                    .map(|p| p.name)
                    .collect(),
            )
        };

        Ok(self
            .pipeline
            .iter()
            .filter_map(|(key, def)| {
                let (project, task) = split_task_key(key);
                let name = TaskName::new(project.unwrap_or(WILDCARD), task);
                let keep = match &selected {
                    None => true,
                    Some(projects) => name.is_wildcard() || projects.contains(&name.project),
                };
                keep.then(|| TaskInfo {
                    name,
                    def: def.clone(),
                })
            })
            .collect())
    }

    /// Canonical key of a user-supplied task key (aliases resolved).
    fn canonical_key(&self, key: &str) -> MonospaceResult<String> {
        Ok(TaskName::parse(key, &self.registry)?.to_string())
    }

    /// Remove entries from the pipeline and save.
    pub fn remove_tasks(&mut self, keys: &[String]) -> MonospaceResult<Vec<String>> {
        let mut removed = Vec::new();
        for key in keys {
            let key = self.canonical_key(key)?;
            self.pipeline.remove_task(&key)?;
            removed.push(key);
        }
        self.save()?;
        Ok(removed)
    }

    /// Create `project#script` entries for package.json scripts.
    ///
    /// With no selectors every script of every project is imported. Existing
    /// entries are left untouched.
    pub fn import_tasks(&mut self, selectors: &[String]) -> MonospaceResult<Vec<String>> {
        let mut candidates: Vec<(Project, Option<String>)> = Vec::new();
        if selectors.is_empty() {
            candidates.push((Project::root(), None));
            candidates.extend(self.registry.all().into_iter().map(|p| (p.clone(), None)));
        } else {
            for selector in selectors {
                let (project, script) = match split_task_key(selector) {
                    (Some(project), script) if !project.is_empty() => (project, script),
                    _ => {
                        return Err(MonospaceError::Config(format!(
                            "'{}' is not of the form PROJECT#SCRIPT",
                            selector
                        )))
                    }
                };
                let project = if project == ROOT_PROJECT {
                    Project::root()
                } else {
                    self.registry.resolve(project).cloned().ok_or_else(|| {
                        MonospaceError::Config(format!("unknown project or alias '{}'", project))
                    })?
                };
                candidates.push((project, Some(script.to_string())));
            }
        }

        let mut imported = Vec::new();
        for (project, script) in candidates {
            let scripts: Vec<String> = match PackageJson::read_from_dir(&project.dir(&self.root))? {
                Some(manifest) => manifest.scripts.into_keys().collect(),
                None => Vec::new(),
            };
            let wanted: Vec<String> = match script {
                Some(script) if scripts.contains(&script) => vec![script],
                Some(script) => {
                    return Err(MonospaceError::Config(format!(
                        "project '{}' has no package.json script '{}'",
                        project.name, script
                    )))
                }
                None => scripts,
            };
            for script in wanted {
                let name = TaskName::new(project.name.as_str(), script);
                if self.pipeline.contains(&name.to_string()) {
                    continue;
                }
                imported.push(name.to_string());
                self.pipeline.insert(name, TaskDef::default());
            }
        }

        self.save()?;
        Ok(imported)
    }

    /// YAML document holding the selected entries (all when `keys` is
    /// empty), for editing.
    pub fn edit_document(&self, keys: &[String]) -> MonospaceResult<String> {
        let mut selected: BTreeMap<String, TaskConfig> = BTreeMap::new();
        if keys.is_empty() {
            selected = self.pipeline.to_config_map();
        } else {
            for key in keys {
                let key = self.canonical_key(key)?;
                let def = self
                    .pipeline
                    .get(&key)
                    .ok_or_else(|| MonospaceError::Pipeline(format!("unknown task '{}'", key)))?;
                selected.insert(key, def.to_config());
            }
        }
        if selected.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_yaml::to_string(&selected)?)
    }

    /// Replace the selected entries with the edited document, then validate
    /// and save. Nothing is saved when the result is invalid.
    pub fn apply_edit(&mut self, keys: &[String], edited: &str) -> MonospaceResult<()> {
        let edited = parse_tasks_config(edited)?;
        let mut raw = self.pipeline.to_config_map();
        if keys.is_empty() {
            raw.clear();
        } else {
            for key in keys {
                raw.remove(&self.canonical_key(key)?);
            }
        }
        raw.extend(edited);

        let pipeline = Pipeline::standardize(&raw, &self.registry)?;
        pipeline.validate()?;
        let previous = std::mem::replace(&mut self.pipeline, pipeline);
        if let Err(e) = self.save() {
            self.pipeline = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn state(&self) -> &StatePinner<SystemGit> {
        &self.state
    }
}

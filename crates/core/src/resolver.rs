//! Task resolution
//!
//! Turns requested task names (`build`, `apps/foo#build`, `foo#build`) and a
//! project filter into the closed set of tasks for one execution, pulling in
//! every transitive dependency.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use globset::{Glob, GlobMatcher};
use tracing::{debug, warn};

use crate::configs::package_json::PackageJson;
use crate::pipeline::{split_task_key, DependencyRef, Pipeline, Task, TaskName, WILDCARD};
use crate::projects::{Project, ProjectRegistry, ROOT_PROJECT};
use crate::types::{MonospaceError, MonospaceResult};

/// Build the filtered project set.
///
/// Each entry is a project name, an alias, a glob over project names or the
/// `root` sentinel; a leading `!` excludes instead. Without any inclusion
/// every registered project is selected. `root` is only honoured when
/// `allow_root` is set.
pub fn filter_projects(
    registry: &ProjectRegistry,
    filters: &[String],
    allow_root: bool,
) -> MonospaceResult<Vec<Project>> {
    let mut includes = Vec::new();
    let mut excludes = Vec::new();
    for filter in filters {
        match filter.strip_prefix('!') {
            Some(excluded) => excludes.push(excluded),
            None => includes.push(filter.as_str()),
        }
    }

    let mut include_root = false;
    let mut selected: BTreeSet<String> = BTreeSet::new();
    if includes.is_empty() {
        selected.extend(registry.all_names());
    }
    for entry in includes {
        if entry == ROOT_PROJECT {
            if !allow_root {
                return Err(MonospaceError::Config(
                    "'root' is not accepted as a project filter here".to_string(),
                ));
            }
            include_root = true;
            continue;
        }
        selected.extend(match_filter(registry, entry)?);
    }
    for entry in excludes {
        if entry == ROOT_PROJECT {
            include_root = false;
            continue;
        }
        for name in match_filter(registry, entry)? {
            selected.remove(&name);
        }
    }

    let mut projects = Vec::new();
    if include_root {
        projects.push(Project::root());
    }
    projects.extend(
        selected
            .iter()
            .filter_map(|name| registry.get_by_name(name))
            .cloned(),
    );
    Ok(projects)
}

fn match_filter(registry: &ProjectRegistry, entry: &str) -> MonospaceResult<Vec<String>> {
    if entry.contains(['*', '?', '[']) {
        let matcher: GlobMatcher = Glob::new(entry)
            .map_err(|e| MonospaceError::Config(format!("invalid project filter '{}': {}", entry, e)))?
            .compile_matcher();
        let matched: Vec<String> = registry
            .all_names()
            .into_iter()
            .filter(|name| matcher.is_match(name))
            .collect();
        if matched.is_empty() {
            warn!(filter = %entry, "project filter matches no project");
        }
        return Ok(matched);
    }

    registry
        .resolve(entry)
        .map(|p| vec![p.name.clone()])
        .ok_or_else(|| MonospaceError::Config(format!("unknown project or alias '{}'", entry)))
}

/// The closed set of tasks selected for one execution.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: BTreeMap<String, Task>,
    deps: BTreeMap<String, BTreeSet<String>>,
}

impl TaskList {
    pub fn get(&self, key: &str) -> Option<&Task> {
        self.tasks.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.tasks.keys()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Resolved dependencies of the task named `key`.
    pub fn dependencies_of(&self, key: &str) -> impl Iterator<Item = &String> {
        self.deps.get(key).into_iter().flatten()
    }

    /// Tasks ordered so that every task comes after its dependencies.
    pub fn topological_order(&self) -> Vec<&Task> {
        fn visit<'a>(
            list: &'a TaskList,
            key: &str,
            seen: &mut BTreeSet<String>,
            order: &mut Vec<&'a Task>,
        ) {
            if !seen.insert(key.to_string()) {
                return;
            }
            for dep in list.dependencies_of(key) {
                visit(list, dep, seen, order);
            }
            if let Some(task) = list.tasks.get(key) {
                order.push(task);
            }
        }

        let mut seen = BTreeSet::new();
        let mut order = Vec::with_capacity(self.tasks.len());
        for key in self.tasks.keys() {
            visit(self, key, &mut seen, &mut order);
        }
        order
    }

    fn insert(&mut self, task: Task) -> bool {
        let key = task.name.to_string();
        if self.tasks.contains_key(&key) {
            return false;
        }
        self.tasks.insert(key.clone(), task);
        self.deps.entry(key).or_default();
        true
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.deps
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }
}

/// Expands requested task names into a [`TaskList`].
pub struct Resolver<'a> {
    pipeline: &'a Pipeline,
    registry: &'a ProjectRegistry,
    root: &'a Path,
    packages: Option<HashMap<String, String>>,
    list: TaskList,
}

impl<'a> Resolver<'a> {
    pub fn new(pipeline: &'a Pipeline, registry: &'a ProjectRegistry, root: &'a Path) -> Self {
        Self {
            pipeline,
            registry,
            root,
            packages: None,
            list: TaskList::default(),
        }
    }

    /// Resolve every requested name against `projects` and return the list.
    pub fn resolve(
        mut self,
        requested: &[String],
        projects: &[Project],
    ) -> MonospaceResult<TaskList> {
        for name in requested {
            self.add(name, projects)?;
        }
        Ok(self.list)
    }

    /// Add one requested task name. Returns how many matches were found.
    pub fn add(&mut self, requested: &str, projects: &[Project]) -> MonospaceResult<usize> {
        let (project, task) = split_task_key(requested);
        let targets: Vec<Project> = match project {
            None | Some("") | Some(WILDCARD) => projects.to_vec(),
            Some(name) => vec![self.project(name).ok_or_else(|| {
                MonospaceError::Resolution(format!(
                    "task '{}' refers to unknown project or alias '{}'",
                    requested, name
                ))
            })?],
        };

        let mut matched = 0;
        for target in &targets {
            if let Some(found) = self.pipeline.lookup(task, &target.name) {
                matched += 1;
                self.insert(found, &mut Vec::new())?;
            }
        }

        if matched == 0 {
            return Err(MonospaceError::Resolution(format!(
                "task '{}' matches nothing for the selected projects",
                requested
            )));
        }
        debug!(requested, matched, "resolved requested task");
        Ok(matched)
    }

    fn project(&self, name: &str) -> Option<Project> {
        if name == ROOT_PROJECT {
            return Some(Project::root());
        }
        self.registry.resolve(name).cloned()
    }

    fn insert(&mut self, task: Task, stack: &mut Vec<String>) -> MonospaceResult<()> {
        let key = task.name.to_string();
        if let Some(pos) = stack.iter().position(|k| *k == key) {
            let mut path = stack[pos..].to_vec();
            path.push(key);
            return Err(MonospaceError::Pipeline(format!(
                "cyclic dependency detected: {}",
                path.join(" -> ")
            )));
        }
        if !self.list.insert(task.clone()) {
            return Ok(());
        }

        stack.push(key.clone());
        for dep in task.def.dependencies() {
            match dep {
                DependencyRef::Task(dep) => {
                    let project = if dep.is_wildcard() {
                        task.name.project.clone()
                    } else {
                        dep.project.clone()
                    };
                    let found = self
                        .project(&project)
                        .and_then(|p| self.pipeline.lookup(&dep.task, &p.name))
                        .ok_or_else(|| {
                            MonospaceError::Resolution(format!(
                                "task '{}' depends on unknown task '{}'",
                                key,
                                TaskName::new(project.as_str(), dep.task.as_str())
                            ))
                        })?;
                    self.link(&key, found, stack)?;
                }
                DependencyRef::Upstream(dep_task) => {
                    for upstream in self.upstream_projects(&task.name.project)? {
                        if let Some(found) = self.pipeline.lookup(&dep_task, &upstream) {
                            self.link(&key, found, stack)?;
                        }
                    }
                }
            }
        }
        stack.pop();
        Ok(())
    }

    fn link(&mut self, from: &str, to: Task, stack: &mut Vec<String>) -> MonospaceResult<()> {
        if to.def.persistent {
            return Err(MonospaceError::Pipeline(format!(
                "task '{}' depends on persistent task '{}'",
                from, to.name
            )));
        }
        self.list.add_edge(from, &to.name.to_string());
        self.insert(to, stack)
    }

    /// Projects of the monorepo that `project`'s package.json depends on.
    fn upstream_projects(&mut self, project: &str) -> MonospaceResult<Vec<String>> {
        let Some(current) = self.project(project) else {
            return Ok(Vec::new());
        };
        let Some(manifest) = PackageJson::read_from_dir(&current.dir(self.root))? else {
            return Ok(Vec::new());
        };

        let registry = self.registry;
        let packages = self.package_index()?;
        let mut upstreams: Vec<String> = manifest
            .dependency_names()
            .into_iter()
            .filter_map(|dep| {
                packages
                    .get(&dep)
                    .cloned()
                    .or_else(|| registry.exists(&dep).then_some(dep))
            })
            .filter(|name| name != &current.name)
            .collect();
        upstreams.sort();
        upstreams.dedup();
        Ok(upstreams)
    }

    /// package.json `name` to project name, for every project that has one.
    fn package_index(&mut self) -> MonospaceResult<&HashMap<String, String>> {
        if self.packages.is_none() {
            let mut index = HashMap::new();
            for project in self.registry.all() {
                if let Some(manifest) = PackageJson::read_from_dir(&project.dir(self.root))? {
                    if let Some(name) = manifest.name {
                        index.insert(name, project.name.clone());
                    }
                }
            }
            self.packages = Some(index);
        }
        Ok(self.packages.get_or_insert_with(HashMap::new))
    }
}

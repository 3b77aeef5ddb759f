//! Pipeline model
//!
//! The raw `pipeline` section of `monospace.yml` is keyed by task patterns
//! such as `build`, `*#build`, `foo#serve` (alias) or `apps/foo#serve`.
//! [`Pipeline::standardize`] turns it into a canonical map keyed by
//! `Project#Task`, where `Project` is either `*` or a full project name, and
//! where every dependency entry is canonical as well:
//!
//! - `test` inside `apps/foo#build` becomes `apps/foo#test`
//! - `test` inside `*#build` becomes `*#test` (same project as the dependent)
//! - `foo#lint` becomes `apps/foo#lint` when `foo` aliases `apps/foo`
//! - `^build` is kept as is: "build in every upstream workspace dependency"

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use petgraph::algo::kosaraju_scc;
use petgraph::graph::DiGraph;

use crate::configs::tasks::{Command, TaskConfig};
use crate::output::OutputMode;
use crate::projects::{ProjectRegistry, ROOT_PROJECT};
use crate::types::{MonospaceError, MonospaceResult};

/// Project part of a task name that applies to every project.
pub const WILDCARD: &str = "*";
/// Prefix of a dependency on the same task in upstream projects.
pub const UPSTREAM_PREFIX: char = '^';

/// A `{project, task}` pair. The canonical string form is `project#task`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskName {
    pub project: String,
    pub task: String,
}

impl TaskName {
    pub fn new(project: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            task: task.into(),
        }
    }

    pub fn wildcard(task: impl Into<String>) -> Self {
        Self::new(WILDCARD, task)
    }

    pub fn is_wildcard(&self) -> bool {
        self.project == WILDCARD
    }

    /// Parse a task key, resolving aliases and validating the project.
    ///
    /// `task` and `#task` both parse to `*#task`.
    pub fn parse(key: &str, registry: &ProjectRegistry) -> MonospaceResult<Self> {
        let (project, task) = split_task_key(key);
        validate_task_part(key, task)?;

        let project = match project {
            None | Some("") | Some(WILDCARD) => WILDCARD.to_string(),
            Some(ROOT_PROJECT) => ROOT_PROJECT.to_string(),
            Some(p) => registry
                .resolve(p)
                .map(|project| project.name.clone())
                .ok_or_else(|| {
                    MonospaceError::Config(format!(
                        "task '{}' refers to unknown project or alias '{}'",
                        key, p
                    ))
                })?,
        };
        Ok(Self::new(project, task))
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.project, self.task)
    }
}

/// Split on the first `#`. The project part is `None` when there is no `#`.
pub fn split_task_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('#') {
        Some((project, task)) => (Some(project), task),
        None => (None, key),
    }
}

fn validate_task_part(key: &str, task: &str) -> MonospaceResult<()> {
    let invalid = task.is_empty()
        || task.contains('#')
        || task.starts_with(UPSTREAM_PREFIX)
        || task.chars().any(char::is_whitespace);
    if invalid {
        return Err(MonospaceError::Config(format!("invalid task name '{}'", key)));
    }
    Ok(())
}

/// A dependency entry of a standardized task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyRef {
    /// A specific task; a `*` project stands for the dependent's own project.
    Task(TaskName),
    /// The named task in each upstream workspace dependency.
    Upstream(String),
}

impl DependencyRef {
    /// Interpret a canonical dependency string.
    pub fn parse(dep: &str) -> Self {
        if let Some(task) = dep.strip_prefix(UPSTREAM_PREFIX) {
            return DependencyRef::Upstream(task.to_string());
        }
        let (project, task) = split_task_key(dep);
        match project {
            Some(p) if !p.is_empty() => DependencyRef::Task(TaskName::new(p, task)),
            _ => DependencyRef::Task(TaskName::wildcard(task)),
        }
    }
}

/// Normalized task definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDef {
    pub cmd: Vec<String>,
    pub description: String,
    pub depends_on: Vec<String>,
    pub output_mode: Option<OutputMode>,
    pub persistent: bool,
    pub env: BTreeMap<String, String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub cache: bool,
}

impl TaskDef {
    pub fn dependencies(&self) -> impl Iterator<Item = DependencyRef> + '_ {
        self.depends_on.iter().map(|d| DependencyRef::parse(d))
    }

    /// Convert back to the persisted form.
    pub fn to_config(&self) -> TaskConfig {
        TaskConfig {
            cmd: Command::Multiple(self.cmd.clone()),
            description: self.description.clone(),
            depends_on: self.depends_on.clone(),
            output_mode: self.output_mode,
            persistent: self.persistent,
            env: self.env.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            cache: self.cache,
        }
    }
}

/// A resolved task. Two tasks are equal when their names are equal.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: TaskName,
    pub def: TaskDef,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Task {}

/// Canonical pipeline: `Project#Task` to definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    tasks: BTreeMap<String, TaskDef>,
    aliases: BTreeMap<String, String>,
}

impl Pipeline {
    /// Normalize a raw pipeline against the project registry.
    pub fn standardize(
        raw: &BTreeMap<String, TaskConfig>,
        registry: &ProjectRegistry,
    ) -> MonospaceResult<Self> {
        let mut tasks = BTreeMap::new();

        for (key, config) in raw {
            let name = TaskName::parse(key, registry)?;
            let canonical = name.to_string();

            let mut depends_on: Vec<String> = Vec::new();
            for dep in &config.depends_on {
                let dep = canonical_dependency(dep, &name, registry).map_err(|e| {
                    MonospaceError::Config(format!("in task '{}': {}", key, e))
                })?;
                if !depends_on.contains(&dep) {
                    depends_on.push(dep);
                }
            }

            let def = TaskDef {
                cmd: config.cmd.argv()?,
                description: config.description.clone(),
                depends_on,
                output_mode: config.output_mode,
                persistent: config.persistent,
                env: config.env.clone(),
                inputs: config.inputs.clone(),
                outputs: config.outputs.clone(),
                cache: config.cache,
            };

            if tasks.insert(canonical.clone(), def).is_some() {
                return Err(MonospaceError::Config(format!(
                    "task '{}' is defined more than once",
                    canonical
                )));
            }
        }

        Ok(Self {
            tasks,
            aliases: registry.aliases().clone(),
        })
    }

    /// The persisted form, keyed by canonical names.
    pub fn to_config_map(&self) -> BTreeMap<String, TaskConfig> {
        self.tasks
            .iter()
            .map(|(key, def)| (key.clone(), def.to_config()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&TaskDef> {
        self.tasks.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn insert(&mut self, name: TaskName, def: TaskDef) {
        self.tasks.insert(name.to_string(), def);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TaskDef)> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up `task` for `project` (a full name or an alias).
    ///
    /// A project-specific definition wins; otherwise the `*#task` entry is
    /// returned as a task named after the concrete project.
    pub fn lookup(&self, task: &str, project: &str) -> Option<Task> {
        let project = self
            .aliases
            .get(project)
            .map(String::as_str)
            .unwrap_or(project);
        self.lookup_exact(task, project)
    }

    /// Remove a task and strip it from every other entry's dependencies.
    pub fn remove_task(&mut self, key: &str) -> MonospaceResult<TaskDef> {
        let removed = self
            .tasks
            .remove(key)
            .ok_or_else(|| MonospaceError::Pipeline(format!("unknown task '{}'", key)))?;
        for def in self.tasks.values_mut() {
            def.depends_on.retain(|dep| dep != key);
        }
        Ok(removed)
    }

    /// Concrete task instances and the edges between them.
    ///
    /// Every project named somewhere in the pipeline gets its own instances;
    /// `*` stands for any other project, which only sees wildcard entries.
    fn instance_graph(&self) -> DiGraph<String, ()> {
        let mut projects = BTreeSet::from([WILDCARD.to_string()]);
        let mut task_names = BTreeSet::new();
        for (key, def) in &self.tasks {
            let (project, task) = split_task_key(key);
            projects.extend(project.map(str::to_string));
            task_names.insert(task.to_string());
            for dep in def.dependencies() {
                if let DependencyRef::Task(dep) = dep {
                    projects.insert(dep.project);
                }
            }
        }

        let mut graph = DiGraph::<String, ()>::new();
        let mut nodes = HashMap::new();
        let mut instances = Vec::new();
        for project in &projects {
            for task in &task_names {
                if let Some(found) = self.lookup_exact(task, project) {
                    let key = found.name.to_string();
                    nodes.insert(key.clone(), graph.add_node(key));
                    instances.push(found);
                }
            }
        }

        for instance in &instances {
            let from = nodes[&instance.name.to_string()];
            for dep in instance.def.dependencies() {
                if let DependencyRef::Task(dep) = dep {
                    let project = if dep.is_wildcard() {
                        instance.name.project.as_str()
                    } else {
                        dep.project.as_str()
                    };
                    let target = TaskName::new(project, dep.task.as_str()).to_string();
                    if let Some(&to) = nodes.get(&target) {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }
        graph
    }

    /// Like [`Pipeline::lookup`] but without alias resolution.
    fn lookup_exact(&self, task: &str, project: &str) -> Option<Task> {
        let name = TaskName::new(project, task);
        self.tasks
            .get(&name.to_string())
            .or_else(|| self.tasks.get(&TaskName::wildcard(task).to_string()))
            .map(|def| Task {
                name,
                def: def.clone(),
            })
    }

    /// Every dependency cycle between task instances, each sorted. A `*`
    /// project in the output stands for any project without its own entry.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let graph = self.instance_graph();

        let mut cycles: Vec<Vec<String>> = kosaraju_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut cycle: Vec<String> =
                    component.iter().map(|node| graph[*node].clone()).collect();
                cycle.sort();
                cycle
            })
            .collect();
        cycles.sort();
        cycles
    }

    pub fn is_acyclic(&self) -> bool {
        self.cycles().is_empty()
    }

    /// Check the invariants required before saving or executing: no cycles
    /// and no dependency on a persistent task.
    pub fn validate(&self) -> MonospaceResult<()> {
        let cycles = self.cycles();
        if !cycles.is_empty() {
            return Err(MonospaceError::Pipeline(format!(
                "cyclic dependency detected: {}",
                describe_cycles(&cycles)
            )));
        }

        let graph = self.instance_graph();
        for edge in graph.raw_edges() {
            let target = &graph[edge.target()];
            let (project, task) = split_task_key(target);
            let persistent = self
                .lookup_exact(task, project.unwrap_or(WILDCARD))
                .is_some_and(|t| t.def.persistent);
            if persistent {
                return Err(MonospaceError::Pipeline(format!(
                    "task '{}' depends on persistent task '{}'",
                    graph[edge.source()], target
                )));
            }
        }
        Ok(())
    }
}

/// Render cycles as `a -> b -> a; c -> c`.
pub fn describe_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            let mut path = cycle.clone();
            if let Some(first) = path.first().cloned() {
                path.push(first);
            }
            path.join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn canonical_dependency(
    dep: &str,
    owner: &TaskName,
    registry: &ProjectRegistry,
) -> MonospaceResult<String> {
    if let Some(task) = dep.strip_prefix(UPSTREAM_PREFIX) {
        validate_task_part(dep, task)?;
        return Ok(format!("{}{}", UPSTREAM_PREFIX, task));
    }
    if !dep.contains('#') {
        validate_task_part(dep, dep)?;
        return Ok(TaskName::new(owner.project.as_str(), dep).to_string());
    }
    Ok(TaskName::parse(dep, registry)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::tasks::parse_tasks_config;
    use proptest::prelude::*;

    fn registry() -> ProjectRegistry {
        let mut registry = ProjectRegistry::new();
        registry.add("apps/foo", "internal").unwrap();
        registry.add("apps/bar", "internal").unwrap();
        registry.add_alias("foo", "apps/foo").unwrap();
        registry
    }

    fn pipeline(yaml: &str) -> Pipeline {
        Pipeline::standardize(&parse_tasks_config(yaml).unwrap(), &registry()).unwrap()
    }

    #[test]
    fn keys_and_dependencies_are_canonicalized() {
        let p = pipeline(
            r#"
build:
  cmd: [make, build]
  depends_on: [test, "^build", "foo#lint"]
"foo#serve":
  cmd: [./serve]
  depends_on: [build]
"#,
        );
        let keys: Vec<_> = p.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["*#build", "apps/foo#serve"]);
        assert_eq!(
            p.get("*#build").unwrap().depends_on,
            vec!["*#test", "^build", "apps/foo#lint"]
        );
        assert_eq!(p.get("apps/foo#serve").unwrap().depends_on, vec!["apps/foo#build"]);
    }

    #[test]
    fn hash_prefix_means_wildcard() {
        let p = pipeline("\"#lint\":\n  cmd: [lint]\n");
        assert!(p.contains("*#lint"));
    }

    #[test]
    fn unknown_project_is_rejected() {
        let raw = parse_tasks_config("\"nope#build\": {}\n").unwrap();
        assert!(Pipeline::standardize(&raw, &registry()).is_err());
    }

    #[test]
    fn duplicates_through_aliases_are_rejected() {
        let raw = parse_tasks_config("\"foo#build\": {}\n\"apps/foo#build\": {}\n").unwrap();
        let err = Pipeline::standardize(&raw, &registry()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn standardize_is_a_fixpoint() {
        let p = pipeline(
            r##"
build:
  cmd: "make build"
  depends_on: [test, "^build"]
"foo#test":
  cmd: [make, test]
  depends_on: ["#fmt", "apps/bar#build"]
"##,
        );
        let again = Pipeline::standardize(&p.to_config_map(), &registry()).unwrap();
        assert_eq!(again, p);
    }

    #[test]
    fn lookup_prefers_specific_definitions() {
        let p = pipeline(
            r#"
"*#test":
  cmd: ["true"]
"apps/foo#test":
  cmd: [make, test]
"#,
        );
        let foo = p.lookup("test", "apps/foo").unwrap();
        assert_eq!(foo.def.cmd, vec!["make", "test"]);
        let bar = p.lookup("test", "apps/bar").unwrap();
        assert_eq!(bar.name.to_string(), "apps/bar#test");
        assert_eq!(bar.def.cmd, vec!["true"]);
        assert!(p.lookup("deploy", "apps/bar").is_none());
    }

    #[test]
    fn lookup_through_alias_is_transparent() {
        let p = pipeline("test:\n  cmd: [\"true\"]\n\"foo#build\":\n  cmd: [make]\n");
        for task in ["test", "build"] {
            let via_alias = p.lookup(task, "foo").unwrap();
            let via_name = p.lookup(task, "apps/foo").unwrap();
            assert_eq!(via_alias, via_name);
            assert_eq!(via_alias.def, via_name.def);
            assert_eq!(via_alias.name.project, "apps/foo");
        }
    }

    #[test]
    fn two_task_cycle_is_detected() {
        let p = pipeline("a:\n  depends_on: [b]\nb:\n  depends_on: [a]\n");
        assert!(!p.is_acyclic());
        assert_eq!(p.cycles(), vec![vec!["*#a".to_string(), "*#b".to_string()]]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("*#a -> *#b -> *#a"));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let p = pipeline("a:\n  depends_on: [a]\n");
        assert!(!p.is_acyclic());
    }

    #[test]
    fn cycle_through_specific_and_wildcard_entries() {
        // For apps/foo: build (wildcard) -> apps/foo#test -> apps/foo#build.
        let p = pipeline(
            "build:\n  depends_on: [test]\n\"apps/foo#test\":\n  depends_on: [\"#build\"]\n\"*#test\": {}\n",
        );
        assert_eq!(
            p.cycles(),
            vec![vec!["apps/foo#build".to_string(), "apps/foo#test".to_string()]]
        );

        // Other projects only see the wildcard entries, which are acyclic.
        let p = pipeline("build:\n  depends_on: [test]\ntest: {}\n\"apps/foo#lint\":\n  depends_on: [build]\n");
        assert!(p.is_acyclic());
    }

    #[test]
    fn cross_project_cycle_is_detected() {
        let p = pipeline(
            "\"apps/foo#build\":\n  depends_on: [\"apps/bar#build\"]\n\"apps/bar#build\":\n  depends_on: [\"foo#build\"]\n",
        );
        assert!(!p.is_acyclic());
    }

    #[test]
    fn dependency_on_persistent_task_is_rejected() {
        let p = pipeline("serve:\n  persistent: true\ne2e:\n  depends_on: [serve]\n");
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("persistent"));
    }

    #[test]
    fn remove_task_strips_dependencies() {
        let mut p = pipeline("build:\n  depends_on: [test]\ntest: {}\n");
        p.remove_task("*#test").unwrap();
        assert!(p.get("*#build").unwrap().depends_on.is_empty());
        assert!(p.remove_task("*#test").is_err());
    }

    #[test]
    fn dependency_refs_parse() {
        assert_eq!(
            DependencyRef::parse("^build"),
            DependencyRef::Upstream("build".into())
        );
        assert_eq!(
            DependencyRef::parse("apps/foo#test"),
            DependencyRef::Task(TaskName::new("apps/foo", "test"))
        );
        assert_eq!(
            DependencyRef::parse("#test"),
            DependencyRef::Task(TaskName::wildcard("test"))
        );
    }

    fn chain_config(deps: &[Vec<usize>], back_edge: Option<(usize, usize)>) -> BTreeMap<String, TaskConfig> {
        let mut raw = BTreeMap::new();
        for (i, potential) in deps.iter().enumerate() {
            let mut depends_on: Vec<String> = potential
                .iter()
                .filter(|_| i > 0)
                .map(|d| format!("t{}", d % i))
                .collect();
            if let Some((from, to)) = back_edge {
                if from == i {
                    depends_on.push(format!("t{}", to));
                }
            }
            raw.insert(
                format!("t{}", i),
                TaskConfig {
                    depends_on,
                    ..TaskConfig::default()
                },
            );
        }
        raw
    }

    proptest! {
        #[test]
        fn forward_only_pipelines_are_acyclic(
            deps in proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), 1..10)
        ) {
            let raw = chain_config(&deps, None);
            let p = Pipeline::standardize(&raw, &ProjectRegistry::new()).unwrap();
            prop_assert!(p.is_acyclic());
        }

        #[test]
        fn a_back_edge_over_a_chain_is_a_cycle(len in 2usize..10, from_seed in any::<usize>()) {
            // t(i) depends on t(i-1); then t0 depends on some t(k), k >= 0.
            let deps: Vec<Vec<usize>> = (0..len).map(|i| if i == 0 { vec![] } else { vec![i - 1] }).collect();
            let to = from_seed % len;
            let raw = chain_config(&deps, Some((0, to)));
            let p = Pipeline::standardize(&raw, &ProjectRegistry::new()).unwrap();
            prop_assert!(!p.is_acyclic());
        }
    }
}

//! Project registry: the projects and aliases declared in `monospace.yml`.
//!
//! A project is identified by its slash-separated path relative to the
//! monorepo root. Its kind is derived from the repository URL it was declared
//! with: an empty URL or `internal` means the outer repository tracks it,
//! `local` means it has its own repository that the outer one ignores, and
//! anything else is the remote of an external clone.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{MonospaceError, MonospaceResult};

/// Reserved name standing for the outer monorepo itself.
pub const ROOT_PROJECT: &str = "root";

const NAME_PATTERN: &str = r"^[A-Za-z_][\w.-]*(/[A-Za-z_][\w.-]*)*$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProjectKind {
    Root,
    Internal,
    Local,
    External,
}

impl ProjectKind {
    /// Derive the kind from the URL a project was declared with.
    pub fn from_repo_url(repo_url: &str) -> Self {
        match repo_url {
            "" | "internal" => ProjectKind::Internal,
            "local" => ProjectKind::Local,
            _ => ProjectKind::External,
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectKind::Root => "root",
            ProjectKind::Internal => "internal",
            ProjectKind::Local => "local",
            ProjectKind::External => "external",
        };
        f.write_str(s)
    }
}

/// An immutable project record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub repo_url: String,
    pub kind: ProjectKind,
}

impl Project {
    /// The sentinel standing for the outer repository.
    pub fn root() -> Self {
        Self {
            name: ROOT_PROJECT.to_string(),
            repo_url: String::new(),
            kind: ProjectKind::Root,
        }
    }

    /// Directory of the project for a monorepo rooted at `root`.
    pub fn dir(&self, root: &Path) -> PathBuf {
        match self.kind {
            ProjectKind::Root => root.to_path_buf(),
            _ => root.join(&self.name),
        }
    }

    pub fn is_root(&self) -> bool {
        self.kind == ProjectKind::Root
    }
}

/// Check a project name against the naming rules (the reserved `root`
/// name is rejected separately).
pub fn valid_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(NAME_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Registry of projects and aliases.
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    projects: BTreeMap<String, Project>,
    aliases: BTreeMap<String, String>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the raw `projects` and `projects_aliases` maps
    /// of the config file.
    pub fn from_maps(
        projects: &BTreeMap<String, String>,
        aliases: &BTreeMap<String, String>,
    ) -> MonospaceResult<Self> {
        let mut registry = Self::new();
        for (name, repo_url) in projects {
            registry.add(name, repo_url)?;
        }
        for (alias, project) in aliases {
            registry.add_alias(alias, project)?;
        }
        Ok(registry)
    }

    pub fn add(&mut self, name: &str, repo_url: &str) -> MonospaceResult<()> {
        if name == ROOT_PROJECT {
            return Err(MonospaceError::Project(format!(
                "'{}' is reserved for the monorepo itself",
                ROOT_PROJECT
            )));
        }
        if !valid_name(name) {
            return Err(MonospaceError::Project(format!(
                "invalid project name '{}'",
                name
            )));
        }
        if self.projects.contains_key(name) {
            return Err(MonospaceError::Project(format!(
                "project '{}' already exists",
                name
            )));
        }
        self.projects.insert(
            name.to_string(),
            Project {
                name: name.to_string(),
                repo_url: repo_url.to_string(),
                kind: ProjectKind::from_repo_url(repo_url),
            },
        );
        Ok(())
    }

    /// Remove a project and every alias pointing to it.
    pub fn remove(&mut self, name: &str) -> MonospaceResult<Project> {
        let project = self
            .projects
            .remove(name)
            .ok_or_else(|| MonospaceError::Project(format!("unknown project '{}'", name)))?;
        self.aliases.retain(|_, target| target != name);
        Ok(project)
    }

    pub fn add_alias(&mut self, alias: &str, project_name: &str) -> MonospaceResult<()> {
        if alias.contains('/') {
            return Err(MonospaceError::Project(format!(
                "alias '{}' must not contain '/'",
                alias
            )));
        }
        if alias == ROOT_PROJECT || !valid_name(alias) {
            return Err(MonospaceError::Project(format!("invalid alias '{}'", alias)));
        }
        if self.aliases.contains_key(alias) {
            return Err(MonospaceError::Project(format!(
                "alias '{}' already exists",
                alias
            )));
        }
        if !self.projects.contains_key(project_name) {
            return Err(MonospaceError::Project(format!(
                "alias '{}' targets unknown project '{}'",
                alias, project_name
            )));
        }
        self.aliases
            .insert(alias.to_string(), project_name.to_string());
        Ok(())
    }

    /// Remove an alias; unknown aliases are ignored.
    pub fn remove_alias(&mut self, alias: &str) {
        self.aliases.remove(alias);
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    pub fn get_by_alias(&self, alias: &str) -> Option<&Project> {
        self.aliases
            .get(alias)
            .and_then(|name| self.projects.get(name))
    }

    /// Resolve either an alias or a full project name.
    pub fn resolve(&self, name_or_alias: &str) -> Option<&Project> {
        if !name_or_alias.contains('/') {
            if let Some(project) = self.get_by_alias(name_or_alias) {
                return Some(project);
            }
        }
        self.get_by_name(name_or_alias)
    }

    /// All projects, sorted by name.
    pub fn all(&self) -> Vec<&Project> {
        self.projects.values().collect()
    }

    pub fn all_names(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    /// Projects of the given kind, sorted by name.
    pub fn of_kind(&self, kind: ProjectKind) -> Vec<&Project> {
        self.projects.values().filter(|p| p.kind == kind).collect()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.projects.contains_key(name)
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    /// First alias pointing at `project_name`, if any.
    pub fn alias_of(&self, project_name: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(_, target)| target.as_str() == project_name)
            .map(|(alias, _)| alias.as_str())
    }

    /// Raw `projects` map, as persisted in the config file.
    pub fn to_project_map(&self) -> BTreeMap<String, String> {
        self.projects
            .values()
            .map(|p| (p.name.clone(), p.repo_url.clone()))
            .collect()
    }
}

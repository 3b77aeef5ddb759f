//! State pinner
//!
//! Named snapshots of the revisions of the outer repository and of every
//! external project, persisted in `.monospace/.pinnedStates.yml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::configs::pinned::{
    load_pinned_states, pinned_states_path, save_pinned_states, PinnedRevision,
};
use crate::git::GitBackend;
use crate::projects::{ProjectKind, ProjectRegistry, ROOT_PROJECT};
use crate::types::{MonospaceError, MonospaceResult};
use crate::ui::Prompter;

/// Why a project is left alone during a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RestoreIssue {
    /// Uncommitted, untracked or ignored files in the worktree.
    Unclean,
    /// No longer in the project registry.
    Unknown,
    /// No `.git` directory.
    NotGit,
}

impl RestoreIssue {
    fn describe(self) -> &'static str {
        match self {
            RestoreIssue::Unclean => "have uncommitted or ignored changes",
            RestoreIssue::Unknown => "are no longer part of the monorepo",
            RestoreIssue::NotGit => "are not git repositories",
        }
    }
}

/// Outcome of a restore.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub skipped: BTreeMap<RestoreIssue, Vec<String>>,
    pub failed: BTreeMap<String, String>,
}

impl RestoreReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct StatePinner<G> {
    root: PathBuf,
    git: G,
    lock: Mutex<()>,
}

impl<G: GitBackend> StatePinner<G> {
    pub fn new(root: &Path, git: G) -> Self {
        Self {
            root: root.to_path_buf(),
            git,
            lock: Mutex::new(()),
        }
    }

    fn path(&self) -> PathBuf {
        pinned_states_path(&self.root)
    }

    fn guard(&self) -> MonospaceResult<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| MonospaceError::State("pinned state lock poisoned".to_string()))
    }

    /// Record the current revisions under `name`.
    pub fn pin(&self, name: &str, registry: &ProjectRegistry) -> MonospaceResult<Vec<PinnedRevision>> {
        let _guard = self.guard()?;
        let path = self.path();
        let mut file = load_pinned_states(&path)?;
        if file.states.contains_key(name) {
            return Err(MonospaceError::State(format!(
                "pinned state '{}' already exists",
                name
            )));
        }

        let mut revisions = vec![PinnedRevision {
            project: ROOT_PROJECT.to_string(),
            rev: self.git.head_revision(&self.root)?,
        }];
        for project in registry.of_kind(ProjectKind::External) {
            revisions.push(PinnedRevision {
                project: project.name.clone(),
                rev: self.git.head_revision(&project.dir(&self.root))?,
            });
        }

        file.states.insert(name.to_string(), revisions.clone());
        save_pinned_states(&path, &file)?;
        info!(state = name, projects = revisions.len(), "pinned state");
        Ok(revisions)
    }

    pub fn unpin(&self, name: &str) -> MonospaceResult<()> {
        let _guard = self.guard()?;
        let path = self.path();
        let mut file = load_pinned_states(&path)?;
        if file.states.remove(name).is_none() {
            return Err(MonospaceError::State(format!("unknown pinned state '{}'", name)));
        }
        save_pinned_states(&path, &file)
    }

    pub fn list(&self) -> MonospaceResult<BTreeMap<String, Vec<PinnedRevision>>> {
        let _guard = self.guard()?;
        Ok(load_pinned_states(&self.path())?.states)
    }

    pub fn get(&self, name: &str) -> MonospaceResult<Vec<PinnedRevision>> {
        self.list()?
            .remove(name)
            .ok_or_else(|| MonospaceError::State(format!("unknown pinned state '{}'", name)))
    }

    fn classify(&self, entry: &PinnedRevision, registry: &ProjectRegistry) -> Result<PathBuf, RestoreIssue> {
        let dir = if entry.project == ROOT_PROJECT {
            self.root.clone()
        } else {
            registry
                .get_by_name(&entry.project)
                .ok_or(RestoreIssue::Unknown)?
                .dir(&self.root)
        };
        if !self.git.is_repository(&dir) {
            return Err(RestoreIssue::NotGit);
        }
        match self.git.is_clean(&dir) {
            Ok(true) => Ok(dir),
            Ok(false) => Err(RestoreIssue::Unclean),
            Err(e) => {
                warn!(project = %entry.project, error = %e, "cannot check worktree status");
                Err(RestoreIssue::Unclean)
            }
        }
    }

    /// Check out the revisions recorded under `name`, root first.
    ///
    /// Projects with issues are listed and need confirmation before the
    /// rest is restored; declining aborts the whole restore.
    pub fn restore(
        &self,
        name: &str,
        registry: &ProjectRegistry,
        prompter: &mut dyn Prompter,
    ) -> MonospaceResult<RestoreReport> {
        let revisions = self.get(name)?;
        let mut report = RestoreReport::default();
        let mut eligible = Vec::new();

        for entry in &revisions {
            match self.classify(entry, registry) {
                Ok(dir) => eligible.push((entry, dir)),
                Err(issue) => report
                    .skipped
                    .entry(issue)
                    .or_default()
                    .push(entry.project.clone()),
            }
        }

        for (issue, projects) in &report.skipped {
            let question = format!(
                "These projects {} and will not be restored: {}. Continue?",
                issue.describe(),
                projects.join(", ")
            );
            prompter.confirm(&question)?;
        }

        // Root is always the first entry of a pinned state.
        eligible.sort_by_key(|(entry, _)| entry.project != ROOT_PROJECT);
        for (entry, dir) in eligible {
            match self.git.checkout(&dir, &entry.rev) {
                Ok(()) => report.restored.push(entry.project.clone()),
                Err(e) => {
                    warn!(project = %entry.project, error = %e, "checkout failed");
                    report.failed.insert(entry.project.clone(), e.to_string());
                }
            }
        }
        info!(
            state = name,
            restored = report.restored.len(),
            failed = report.failed.len(),
            "restored state"
        );
        Ok(report)
    }
}

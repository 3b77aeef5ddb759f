//! JS package manager selection
//!
//! Selection chain for a project without an explicit `cmd`:
//! the project's `packageManager` field, then the workspace
//! `js_package_manager` setting, then a lockfile probe. When both settings
//! are present they must name the same manager and, if both pin a version,
//! the same major version.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::types::{MonospaceError, MonospaceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManagerKind {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManagerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageManagerKind::Npm => "npm",
            PackageManagerKind::Pnpm => "pnpm",
            PackageManagerKind::Yarn => "yarn",
            PackageManagerKind::Bun => "bun",
        }
    }

    /// Files whose presence in a directory hints at this manager.
    fn hints(self) -> &'static [&'static str] {
        match self {
            PackageManagerKind::Npm => &["package-lock.json"],
            PackageManagerKind::Pnpm => &["pnpm-lock.yaml", "pnpm-workspace.yaml"],
            PackageManagerKind::Yarn => &["yarn.lock", ".yarnrc.yml"],
            PackageManagerKind::Bun => &["bun.lockb", "bun.lock"],
        }
    }

    const ALL: [PackageManagerKind; 4] = [
        PackageManagerKind::Npm,
        PackageManagerKind::Pnpm,
        PackageManagerKind::Yarn,
        PackageManagerKind::Bun,
    ];
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManagerKind {
    type Err = MonospaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageManagerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| MonospaceError::Runner(format!("unsupported package manager '{}'", s)))
    }
}

/// A package manager with an optional pinned version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManager {
    pub kind: PackageManagerKind,
    pub version: Option<String>,
}

impl PackageManager {
    pub fn new(kind: PackageManagerKind) -> Self {
        Self {
            kind,
            version: None,
        }
    }

    /// Parse `pnpm`, `pnpm@9.1.0`, `^pnpm@9.1.0` or
    /// `yarn@4.1.0+sha512.abc...`.
    pub fn parse(spec: &str) -> MonospaceResult<Self> {
        let spec = spec.trim().trim_start_matches(['^', '~', '=']);
        let (name, version) = match spec.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (spec, None),
        };
        let version = version
            .map(|v| v.split('+').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Self {
            kind: name.trim().parse()?,
            version,
        })
    }

    /// Normalized form as stored in the workspace config: `^name@version`,
    /// or just the name when unpinned.
    pub fn normalized(&self) -> String {
        match &self.version {
            Some(version) => format!("^{}@{}", self.kind, version),
            None => self.kind.to_string(),
        }
    }

    pub fn major(&self) -> Option<u64> {
        self.version
            .as_deref()
            .and_then(|v| v.split('.').next())
            .and_then(|major| major.parse().ok())
    }

    /// Same manager and, when both pin one, the same major version.
    pub fn agrees_with(&self, other: &PackageManager) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match (self.major(), other.major()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// The argv running a package.json script.
    pub fn run_script(&self, script: &str) -> Vec<String> {
        vec![
            self.kind.to_string(),
            "run".to_string(),
            script.to_string(),
        ]
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

/// Infer the manager from lockfiles and workspace hints in `dir`.
///
/// `Ok(None)` when nothing is found; an error when hints disagree.
pub fn probe(dir: &Path) -> MonospaceResult<Option<PackageManagerKind>> {
    let found: Vec<PackageManagerKind> = PackageManagerKind::ALL
        .into_iter()
        .filter(|kind| kind.hints().iter().any(|hint| dir.join(hint).exists()))
        .collect();
    match found.as_slice() {
        [] => Ok(None),
        [kind] => Ok(Some(*kind)),
        many => Err(MonospaceError::Runner(format!(
            "cannot infer the package manager of '{}': found hints for {}",
            dir.display(),
            many.iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Pick the package manager for a project.
///
/// `search` is the list of directories probed, in order, when neither
/// setting is present (typically the project directory, then the root).
pub fn select(
    project_field: Option<&str>,
    workspace_setting: Option<&str>,
    search: &[&Path],
) -> MonospaceResult<PackageManager> {
    let project = project_field
        .filter(|s| !s.trim().is_empty())
        .map(PackageManager::parse)
        .transpose()?;
    let workspace = workspace_setting
        .filter(|s| !s.trim().is_empty())
        .map(PackageManager::parse)
        .transpose()?;

    match (project, workspace) {
        (Some(project), Some(workspace)) => {
            if !project.agrees_with(&workspace) {
                return Err(MonospaceError::Runner(format!(
                    "packageManager '{}' does not match the workspace setting '{}'",
                    project, workspace
                )));
            }
            Ok(project)
        }
        (Some(pm), None) | (None, Some(pm)) => Ok(pm),
        (None, None) => {
            for dir in search {
                if let Some(kind) = probe(dir)? {
                    return Ok(PackageManager::new(kind));
                }
            }
            Err(MonospaceError::Runner(
                "no package manager configured and none could be inferred".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes() {
        let pm = PackageManager::parse("pnpm@9.1.0").unwrap();
        assert_eq!(pm.kind, PackageManagerKind::Pnpm);
        assert_eq!(pm.normalized(), "^pnpm@9.1.0");
        assert_eq!(pm.major(), Some(9));

        let pm = PackageManager::parse("yarn@4.1.0+sha512.deadbeef").unwrap();
        assert_eq!(pm.version.as_deref(), Some("4.1.0"));
        assert_eq!(PackageManager::parse("^npm").unwrap().normalized(), "npm");
        assert!(PackageManager::parse("cargo@1").is_err());
    }

    #[test]
    fn agreement_checks_name_and_major() {
        let a = PackageManager::parse("pnpm@9.1.0").unwrap();
        assert!(a.agrees_with(&PackageManager::parse("^pnpm@9.4.2").unwrap()));
        assert!(a.agrees_with(&PackageManager::parse("pnpm").unwrap()));
        assert!(!a.agrees_with(&PackageManager::parse("pnpm@8.0.0").unwrap()));
        assert!(!a.agrees_with(&PackageManager::parse("yarn@9.1.0").unwrap()));
    }

    #[test]
    fn selection_chain() {
        let dir = tempfile::tempdir().unwrap();
        let search = [dir.path()];

        let pm = select(Some("yarn@4.0.0"), None, &search).unwrap();
        assert_eq!(pm.kind, PackageManagerKind::Yarn);
        let pm = select(None, Some("^pnpm@9.1.0"), &search).unwrap();
        assert_eq!(pm.kind, PackageManagerKind::Pnpm);
        assert!(select(Some("yarn@4"), Some("^pnpm@9.1.0"), &search).is_err());
        assert!(select(None, None, &search).is_err());

        std::fs::write(dir.path().join("pnpm-lock.yaml"), "").unwrap();
        assert_eq!(
            select(None, None, &search).unwrap().kind,
            PackageManagerKind::Pnpm
        );

        std::fs::write(dir.path().join("yarn.lock"), "").unwrap();
        let err = select(None, None, &search).unwrap_err();
        assert!(err.to_string().contains("pnpm, yarn"));
    }

    #[test]
    fn run_script_argv() {
        let pm = PackageManager::new(PackageManagerKind::Bun);
        assert_eq!(pm.run_script("build"), vec!["bun", "run", "build"]);
    }
}

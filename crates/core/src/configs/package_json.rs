use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::types::MonospaceResult;

pub const PACKAGE_JSON: &str = "package.json";

/// The parts of a `package.json` manifest the pipeline cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "packageManager")]
    pub package_manager: Option<String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: serde_json::Map<String, serde_json::Value>,
}

impl PackageJson {
    pub fn parse(contents: &str) -> MonospaceResult<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Read `<dir>/package.json`; `Ok(None)` when the file does not exist.
    pub fn read_from_dir(dir: &Path) -> MonospaceResult<Option<Self>> {
        let path = dir.join(PACKAGE_JSON);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Self::parse(&contents).map(Some)
    }

    /// Names listed under dependencies, devDependencies and
    /// optionalDependencies, sorted and deduplicated.
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [
            &self.dependencies,
            &self.dev_dependencies,
            &self.optional_dependencies,
        ]
        .into_iter()
        .flat_map(|map| map.keys().cloned())
        .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn has_script(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::configs::tasks::TaskConfig;
use crate::configs::write_atomic;
use crate::output::OutputMode;
use crate::types::{MonospaceError, MonospaceResult};

/// Directory holding the workbench configuration, relative to the root.
pub const CONFIG_DIR: &str = ".monospace";
pub const CONFIG_FILE: &str = "monospace.yml";

/// The `monospace.yml` file.
///
/// Field order here is the order fields are written back to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MonospaceConfig {
    /// Default module prefix for new Go projects.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub go_mod_prefix: String,
    /// JS package manager used across the workspace, e.g. `^pnpm@9.1.0`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub js_package_manager: String,
    /// Output mode used by `run` and `exec` when none is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_output_mode: Option<OutputMode>,
    /// Project name to repository URL, `internal` or `local`.
    #[serde(default)]
    pub projects: BTreeMap<String, String>,
    /// Alias to project name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub projects_aliases: BTreeMap<String, String>,
    /// Task key to task definition.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pipeline: BTreeMap<String, TaskConfig>,
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(CONFIG_FILE)
}

pub fn parse_monospace_config(yaml_str: &str) -> MonospaceResult<MonospaceConfig> {
    if yaml_str.trim().is_empty() {
        return Ok(MonospaceConfig::default());
    }
    let config: MonospaceConfig = serde_yaml::from_str(yaml_str)?;
    Ok(config)
}

pub fn load_monospace_config(root: &Path) -> MonospaceResult<MonospaceConfig> {
    let path = config_path(root);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        MonospaceError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    parse_monospace_config(&content).map_err(|e| {
        MonospaceError::Config(format!("Failed to parse config {}: {}", path.display(), e))
    })
}

pub fn save_monospace_config(root: &Path, config: &MonospaceConfig) -> MonospaceResult<()> {
    let content = serde_yaml::to_string(config)?;
    write_atomic(&config_path(root), &content)
}

/// JSON schema of `monospace.yml`, for editor integration.
pub fn config_schema() -> MonospaceResult<String> {
    let schema = schemars::schema_for!(MonospaceConfig);
    Ok(serde_json::to_string_pretty(&schema)?)
}

/// Walk up from `start` to the first directory holding a monospace config.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| config_path(dir).is_file())
        .map(Path::to_path_buf)
}

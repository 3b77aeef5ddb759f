use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::lexer;
use crate::output::OutputMode;
use crate::types::{MonospaceError, MonospaceResult};

/// A task command: either a single string split with the argument lexer or
/// an explicit argv list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Command {
    Single(String),
    Multiple(Vec<String>),
}

impl Default for Command {
    fn default() -> Self {
        Command::Multiple(Vec::new())
    }
}

impl Command {
    pub fn is_empty(&self) -> bool {
        match self {
            Command::Single(cmd) => cmd.trim().is_empty(),
            Command::Multiple(cmds) => cmds.is_empty(),
        }
    }

    /// The argv form of the command.
    pub fn argv(&self) -> MonospaceResult<Vec<String>> {
        match self {
            Command::Single(cmd) => lexer::lex(cmd),
            Command::Multiple(cmds) => Ok(cmds.clone()),
        }
    }
}

/// Raw task definition, as written under `pipeline:` in `monospace.yml`.
///
/// Unknown keys are rejected, so misspellings such as `peristent` fail the
/// load instead of being silently ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default, skip_serializing_if = "Command::is_empty")]
    pub cmd: Command,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mode: Option<OutputMode>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub persistent: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Reserved for output caching; not consulted by execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    /// Reserved for output caching; not consulted by execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    /// Reserved for output caching; not consulted by execution.
    #[serde(default, skip_serializing_if = "is_false")]
    pub cache: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Parse a standalone mapping of task keys to definitions, as produced by
/// `tasks edit`.
pub fn parse_tasks_config(yaml_str: &str) -> MonospaceResult<BTreeMap<String, TaskConfig>> {
    if yaml_str.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_yaml::from_str(yaml_str)
        .map_err(|e| MonospaceError::Config(format!("invalid task definitions: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_accepts_string_or_list() {
        let tasks = parse_tasks_config(
            r#"
build:
  cmd: make "build all"
test:
  cmd: ["cargo", "test"]
"#,
        )
        .unwrap();
        assert_eq!(tasks["build"].cmd.argv().unwrap(), vec!["make", "build all"]);
        assert_eq!(tasks["test"].cmd.argv().unwrap(), vec!["cargo", "test"]);
    }

    #[test]
    fn misspelled_persistent_is_rejected() {
        let err = parse_tasks_config("serve:\n  cmd: [serve]\n  peristent: true\n").unwrap_err();
        assert!(err.to_string().contains("peristent"));

        let ok = parse_tasks_config("serve:\n  cmd: [serve]\n  persistent: true\n").unwrap();
        assert!(ok["serve"].persistent);
    }

    #[test]
    fn defaults_are_not_serialized() {
        let task = TaskConfig {
            cmd: Command::Multiple(vec!["true".into()]),
            ..TaskConfig::default()
        };
        let yaml = serde_yaml::to_string(&task).unwrap();
        assert!(yaml.starts_with("cmd:"));
        for key in ["description", "depends_on", "persistent", "env", "cache"] {
            assert!(!yaml.contains(key), "unexpected key {key} in {yaml}");
        }
        let back: TaskConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn output_mode_uses_kebab_case() {
        let tasks = parse_tasks_config("lint:\n  output_mode: errors-only\n").unwrap();
        assert_eq!(tasks["lint"].output_mode, Some(OutputMode::ErrorsOnly));
    }
}

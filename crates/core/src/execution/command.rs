//! Subprocess invocations
//!
//! A [`ProcessSpec`] is the fully-resolved description of a subprocess job:
//! program, arguments, working directory and the environment entries added on
//! top of the inherited process environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::lexer;
use crate::types::{MonospaceError, MonospaceResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl ProcessSpec {
    /// Build a spec from an argv; the first element is the program.
    pub fn new(argv: &[String], cwd: &Path) -> MonospaceResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| MonospaceError::Runner("empty command".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
        })
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// The command line, quoted so it can be pasted into a shell.
    pub fn display(&self) -> String {
        lexer::join(&self.argv())
    }

    /// A tokio command with captured output and no stdin.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.cwd)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

//! Git adapter
//!
//! The state pinner only needs four questions answered about a working
//! tree. [`SystemGit`] answers them by running the `git` binary with an
//! explicit working directory.

use std::path::Path;
use std::process::{Command, Output};

use tracing::debug;

use crate::types::{MonospaceError, MonospaceResult};

pub trait GitBackend {
    /// Full revision hash of `HEAD`.
    fn head_revision(&self, dir: &Path) -> MonospaceResult<String>;
    /// No uncommitted changes, untracked or ignored files.
    fn is_clean(&self, dir: &Path) -> MonospaceResult<bool>;
    fn checkout(&self, dir: &Path, rev: &str) -> MonospaceResult<()>;
    /// Whether `dir` is the top of a git working tree.
    fn is_repository(&self, dir: &Path) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct SystemGit;

impl SystemGit {
    fn run(&self, dir: &Path, args: &[&str]) -> MonospaceResult<Output> {
        debug!(dir = %dir.display(), ?args, "running git");
        let output = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .map_err(|e| MonospaceError::Git(format!("failed to run git: {}", e)))?;
        if !output.status.success() {
            return Err(MonospaceError::Git(format!(
                "git {} failed in '{}': {}",
                args.join(" "),
                dir.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

impl GitBackend for SystemGit {
    fn head_revision(&self, dir: &Path) -> MonospaceResult<String> {
        let output = self.run(dir, &["rev-parse", "HEAD"])?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn is_clean(&self, dir: &Path) -> MonospaceResult<bool> {
        let output = self.run(dir, &["status", "--porcelain", "--ignored"])?;
        Ok(output.stdout.iter().all(u8::is_ascii_whitespace))
    }

    fn checkout(&self, dir: &Path, rev: &str) -> MonospaceResult<()> {
        self.run(dir, &["checkout", "--quiet", rev]).map(|_| ())
    }

    fn is_repository(&self, dir: &Path) -> bool {
        dir.join(".git").exists()
    }
}

//! Configuration files
//!
//! - [`monospace`] - the `.monospace/monospace.yml` workbench config
//! - [`tasks`] - raw task definitions as written in the `pipeline` section
//! - [`pinned`] - the `.monospace/.pinnedStates.yml` sidecar file
//! - [`package_json`] - the subset of `package.json` the pipeline consults

pub mod monospace;
pub mod package_json;
pub mod pinned;
pub mod tasks;

use std::io::Write;
use std::path::Path;

use crate::types::{MonospaceError, MonospaceResult};

/// Write `contents` to `path` atomically: a temporary file is created next
/// to the target and renamed over it.
pub fn write_atomic(path: &Path, contents: &str) -> MonospaceResult<()> {
    let dir = path.parent().ok_or_else(|| {
        MonospaceError::Config(format!("'{}' has no parent directory", path.display()))
    })?;
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|e| MonospaceError::Io(e.error))?;
    Ok(())
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::configs::monospace::CONFIG_DIR;
use crate::configs::write_atomic;
use crate::types::MonospaceResult;

pub const PINNED_STATES_FILE: &str = ".pinnedStates.yml";

const HEADER: &str = "# This file is maintained by `monospace state`.\n\
# Do not edit it manually: use `monospace state pin|unpin` instead.\n";

/// One pinned revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedRevision {
    pub project: String,
    pub rev: String,
}

/// The `.pinnedStates.yml` sidecar file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedStatesFile {
    #[serde(default)]
    pub states: BTreeMap<String, Vec<PinnedRevision>>,
}

pub fn pinned_states_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(PINNED_STATES_FILE)
}

/// Load the pinned states; a missing file is an empty table.
pub fn load_pinned_states(path: &Path) -> MonospaceResult<PinnedStatesFile> {
    if !path.exists() {
        return Ok(PinnedStatesFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    if content.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with('#')) {
        return Ok(PinnedStatesFile::default());
    }
    Ok(serde_yaml::from_str(&content)?)
}

pub fn save_pinned_states(path: &Path, states: &PinnedStatesFile) -> MonospaceResult<()> {
    let body = serde_yaml::to_string(states)?;
    write_atomic(path, &format!("{}{}", HEADER, body))
}

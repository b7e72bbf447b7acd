//! Local mock directory configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Root of the mock definition tree. Must exist when mocking is enabled.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Reload the table when files under `dir` change.
    #[serde(default = "default_true")]
    pub watch: bool,
}

fn default_true() -> bool {
    true
}

fn default_dir() -> PathBuf {
    PathBuf::from("./mock")
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_dir(),
            watch: true,
        }
    }
}

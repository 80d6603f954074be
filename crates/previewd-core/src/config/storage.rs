//! File and cache storage configuration.

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for all runtime data.
    pub data_root: String,
    /// Root directory holding the original user files. Request paths are
    /// resolved beneath this root by the API layer; the engine itself
    /// trusts the resolved absolute path.
    pub files_root: String,
    /// Directory for generated derivative artifacts.
    pub cache_root: String,
    /// Directory for per-conversion scratch workspaces.
    pub scratch_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: "./data".to_string(),
            files_root: "./data/files".to_string(),
            cache_root: "./data/cache".to_string(),
            scratch_root: "./data/tmp".to_string(),
        }
    }
}

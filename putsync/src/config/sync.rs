//! Settings for the sync loop.

use std::path::PathBuf;
use std::time::Duration;

use super::file::ConfigError;
use crate::remote::DEFAULT_API_URL;
use crate::sync::DEFAULT_CHECK_INTERVAL;

/// Remote folder synced by default, created under the account root.
pub const DEFAULT_REMOTE_FOLDER: &str = "Putio Desktop";

/// `<home>/Putio Desktop`, or a relative `Putio Desktop` without a home.
pub fn default_local_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_REMOTE_FOLDER))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REMOTE_FOLDER))
}

/// What to sync, where, and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// OAuth token for the API.
    pub oauth_token: String,

    /// Name of the root-level remote folder to mirror.
    pub remote_folder: String,

    /// Local directory receiving the files.
    pub local_path: PathBuf,

    /// Pause between passes.
    pub check_interval: Duration,

    /// API base URL.
    pub api_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            oauth_token: String::new(),
            remote_folder: DEFAULT_REMOTE_FOLDER.to_string(),
            local_path: default_local_path(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl SyncConfig {
    /// Check the settings a sync cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oauth_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.remote_folder.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                section: "putio".to_string(),
                key: "folder".to_string(),
                value: self.remote_folder.clone(),
                reason: "folder name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

//! INI configuration file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use super::sync::{default_local_path, SyncConfig, DEFAULT_REMOTE_FOLDER};
use crate::download::{DownloadConfig, RetryPolicy, DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS};
use crate::remote::DEFAULT_API_URL;

/// Errors loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid INI.
    #[error("failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// A key holds a value of the wrong shape.
    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// No OAuth token in the file or on the command line.
    #[error("no OAuth token configured (set [putio] oauth_token or pass --oauth-token)")]
    MissingToken,
}

/// Default config file location: `<config dir>/putsync/config.ini`.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("putsync").join("config.ini"))
}

/// `[putio]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutioSection {
    pub oauth_token: Option<String>,
    pub folder: String,
    pub api_url: String,
}

impl Default for PutioSection {
    fn default() -> Self {
        Self {
            oauth_token: None,
            folder: DEFAULT_REMOTE_FOLDER.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSection {
    pub local_path: PathBuf,
    pub check_minutes: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            check_minutes: 10,
        }
    }
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSection {
    pub workers: usize,
    pub chunk_size: u64,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for DownloadSection {
    fn default() -> Self {
        let download = DownloadConfig::default();
        Self {
            workers: DEFAULT_WORKERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_secs: download.timeout.as_secs(),
            max_attempts: download.retry.max_attempts,
            retry_delay_secs: download.retry.delay.as_secs(),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub putio: PutioSection,
    pub sync: SyncSection,
    pub download: DownloadSection,
}

impl ConfigFile {
    /// Load from the default location, or defaults if there is no file.
    pub fn load() -> Result<Self, ConfigError> {
        match config_file_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let ini = Ini::load_from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_ini(&ini)
    }

    /// Interpret parsed INI data. Unknown keys are ignored.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("putio")) {
            if let Some(token) = non_empty(section, "oauth_token") {
                config.putio.oauth_token = Some(token.to_string());
            }
            if let Some(folder) = non_empty(section, "folder") {
                config.putio.folder = folder.to_string();
            }
            if let Some(api_url) = non_empty(section, "api_url") {
                config.putio.api_url = api_url.to_string();
            }
        }

        if let Some(section) = ini.section(Some("sync")) {
            if let Some(path) = non_empty(section, "local_path") {
                config.sync.local_path = expand_home(path);
            }
            if let Some(minutes) = parse_key(section, "sync", "check_minutes")? {
                config.sync.check_minutes = minutes;
            }
        }

        if let Some(section) = ini.section(Some("download")) {
            let d = &mut config.download;
            if let Some(workers) = parse_key(section, "download", "workers")? {
                d.workers = positive(workers, "download", "workers")?;
            }
            if let Some(chunk_size) = parse_key(section, "download", "chunk_size")? {
                d.chunk_size = positive(chunk_size, "download", "chunk_size")?;
            }
            if let Some(timeout) = parse_key(section, "download", "timeout_secs")? {
                d.timeout_secs = timeout;
            }
            if let Some(attempts) = parse_key(section, "download", "max_attempts")? {
                d.max_attempts = positive(attempts, "download", "max_attempts")?;
            }
            if let Some(delay) = parse_key(section, "download", "retry_delay_secs")? {
                d.retry_delay_secs = delay;
            }
        }

        Ok(config)
    }

    /// Sync settings, before command-line overrides.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            oauth_token: self.putio.oauth_token.clone().unwrap_or_default(),
            remote_folder: self.putio.folder.clone(),
            local_path: self.sync.local_path.clone(),
            check_interval: Duration::from_secs(self.sync.check_minutes * 60),
            api_url: self.putio.api_url.clone(),
        }
    }

    /// Download settings, before command-line overrides.
    pub fn download_config(&self) -> DownloadConfig {
        let d = &self.download;
        DownloadConfig::new()
            .with_workers(d.workers)
            .with_chunk_size(d.chunk_size)
            .with_timeout(Duration::from_secs(d.timeout_secs))
            .with_retry(RetryPolicy::new(
                d.max_attempts,
                Duration::from_secs(d.retry_delay_secs),
            ))
    }
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn parse_key<T>(section: &Properties, name: &str, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(section, key) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                section: name.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            }),
    }
}

fn positive<T>(value: T, section: &str, key: &str) -> Result<T, ConfigError>
where
    T: PartialEq + Default + ToString,
{
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

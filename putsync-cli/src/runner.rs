//! Shared command setup: logging and configuration.

use std::path::Path;

use putsync::config::ConfigFile;
use putsync::logging::{init_logging, LoggingGuard};

use crate::error::CliError;

/// Holds what every command needs for its lifetime.
pub struct CliRunner {
    config: ConfigFile,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Install logging, then load the config file.
    ///
    /// `config_path` overrides the default location.
    pub fn new(config_path: Option<&Path>, log_file: Option<&Path>) -> Result<Self, CliError> {
        let logging = init_logging(log_file)?;

        let config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        Ok(Self {
            config,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        tracing::info!(version = putsync::VERSION, command, "putsync starting");
    }
}

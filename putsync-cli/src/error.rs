//! CLI error type.

use std::fmt;

use putsync::config::ConfigError;
use putsync::download::DownloadError;
use putsync::logging::LoggingError;
use putsync::remote::RemoteError;

/// Errors surfaced to the user.
#[derive(Debug)]
pub enum CliError {
    /// Bad or missing configuration.
    Config(String),

    /// Logging could not be set up.
    Logging(LoggingError),

    /// A download failed.
    Download(DownloadError),

    /// The remote service could not be reached or understood.
    Remote(RemoteError),

    /// The download stopped with chunks still missing.
    Incomplete { missing_chunks: u64 },

    /// Ctrl+C was pressed.
    Interrupted,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Interrupted => 130,
            CliError::Incomplete { .. } => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Download(e) => write!(f, "Download error: {}", e),
            CliError::Remote(e) => write!(f, "put.io error: {}", e),
            CliError::Incomplete { missing_chunks } => write!(
                f,
                "Download incomplete ({} chunk(s) missing). Run the same command again to resume.",
                missing_chunks
            ),
            CliError::Interrupted => {
                write!(f, "Interrupted. Partial downloads resume on the next run.")
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Download(e) => Some(e),
            CliError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::Cancelled => CliError::Interrupted,
            other => CliError::Download(other),
        }
    }
}

impl From<RemoteError> for CliError {
    fn from(e: RemoteError) -> Self {
        CliError::Remote(e)
    }
}

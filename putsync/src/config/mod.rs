//! Configuration file handling.
//!
//! Settings live in an INI file at `<config dir>/putsync/config.ini`:
//!
//! ```ini
//! [putio]
//! oauth_token = XXXXXXXX
//! folder = Putio Desktop
//!
//! [sync]
//! local_path = ~/Putio Desktop
//! check_minutes = 10
//!
//! [download]
//! workers = 10
//! chunk_size = 32768
//! timeout_secs = 300
//! max_attempts = 3
//! retry_delay_secs = 10
//! ```
//!
//! A missing file yields defaults. Command-line flags override file values.

mod file;
mod sync;

pub use file::{
    config_file_path, ConfigError, ConfigFile, DownloadSection, PutioSection, SyncSection,
};
pub use sync::{default_local_path, SyncConfig, DEFAULT_REMOTE_FOLDER};

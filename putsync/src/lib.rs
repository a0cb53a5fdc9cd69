//! putsync - Keep a local folder in step with a put.io folder
//!
//! The core of this library is [`download`]: a resumable, multi-connection
//! range downloader that persists per-chunk progress next to the payload
//! and only publishes a file once every byte is on disk. Around it,
//! [`remote`] talks to the put.io API, [`sync`] walks the remote tree and
//! re-scans it periodically, [`config`] loads settings and [`logging`]
//! installs the tracing subscriber.

pub mod config;
pub mod download;
pub mod logging;
pub mod remote;
pub mod sync;

/// Version of the putsync library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

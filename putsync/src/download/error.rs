//! Error types for resumable range downloads.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while running a download job.
///
/// Variants fall into three groups: setup errors (the temp file could not
/// be prepared), local write errors (the disk refused bytes mid-transfer)
/// and transport errors (anything between us and the remote bytes).
/// Only transport errors are worth retrying.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Failed to create the parent directory of the destination.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to create, open or size the temporary file.
    #[error("failed to prepare {}: {source}", path.display())]
    SetupFailed { path: PathBuf, source: io::Error },

    /// Failed to read the persisted bitmap back from the temporary file.
    #[error("failed to read progress bitmap from {}: {source}", path.display())]
    BitmapReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write payload or bitmap bytes to the temporary file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to truncate or rename the completed temporary file.
    #[error("failed to finalize {} -> {}: {source}", from.display(), to.display())]
    FinalizeFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// The URL could not be parsed or resolved.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with an unusable status code.
    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The response body could not be read.
    #[error("failed reading response from {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: io::Error,
    },

    /// The response body ended before the requested range was complete.
    #[error("response from {url} ended at byte {received}, expected {expected}")]
    PrematureEof {
        url: String,
        received: u64,
        expected: u64,
    },

    /// A 206 response covered a different range than the one requested.
    #[error("response from {url} starts elsewhere than byte {requested} (Content-Range: {content_range})")]
    RangeMismatch {
        url: String,
        requested: u64,
        content_range: String,
    },

    /// A redirect response did not carry a usable Location header.
    #[error("redirect from {url} without a Location header")]
    MissingLocation { url: String },

    /// The redirect chain was longer than we are willing to follow.
    #[error("too many redirects starting at {url}")]
    TooManyRedirects { url: String },

    /// The server did not report a usable Content-Length.
    #[error("no content length reported for {url}")]
    UnknownSize { url: String },

    /// The job was cancelled by its caller.
    #[error("download cancelled")]
    Cancelled,

    /// A worker thread panicked.
    #[error("range worker panicked")]
    WorkerPanicked,
}

impl DownloadError {
    /// Whether the error came from the network side and the same range may
    /// succeed if asked for again.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DownloadError::Request { .. }
                | DownloadError::Status { .. }
                | DownloadError::Read { .. }
                | DownloadError::PrematureEof { .. }
                | DownloadError::RangeMismatch { .. }
                | DownloadError::MissingLocation { .. }
                | DownloadError::TooManyRedirects { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let status = DownloadError::Status {
            url: "http://a".to_string(),
            status: 503,
        };
        assert!(status.is_transport());

        let eof = DownloadError::PrematureEof {
            url: "http://a".to_string(),
            received: 10,
            expected: 20,
        };
        assert!(eof.is_transport());

        let shifted = DownloadError::RangeMismatch {
            url: "http://a".to_string(),
            requested: 100,
            content_range: "bytes 0-99/200".to_string(),
        };
        assert!(shifted.is_transport());

        let write = DownloadError::WriteFailed {
            path: PathBuf::from("/a"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert!(!write.is_transport());
        assert!(!DownloadError::Cancelled.is_transport());
    }

    #[test]
    fn test_error_display() {
        let err = DownloadError::Status {
            url: "http://example.com/f".to_string(),
            status: 416,
        };
        assert_eq!(
            err.to_string(),
            "unexpected HTTP status 416 from http://example.com/f"
        );

        let err = DownloadError::PrematureEof {
            url: "http://a".to_string(),
            received: 5,
            expected: 9,
        };
        assert!(err.to_string().contains("ended at byte 5"));
    }
}

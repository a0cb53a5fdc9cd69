//! Errors from the remote file service.

use thiserror::Error;

/// Result type for remote service calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors talking to the remote file service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// A URL could not be built or parsed.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP client could not be created.
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request never got a response.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response body was not the expected JSON.
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let err = RemoteError::Status {
            url: "https://api.put.io/v2/files/list".to_string(),
            status: 401,
        };
        assert_eq!(
            err.to_string(),
            "https://api.put.io/v2/files/list returned HTTP 401"
        );
    }
}

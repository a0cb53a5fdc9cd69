//! Tunables for range downloads.

use std::time::Duration;

/// Default chunk size: the granularity of resumability (32 KiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 32 * 1024;

/// Default number of simultaneous range workers per file.
pub const DEFAULT_WORKERS: usize = 10;

/// Default timeout for a single HTTP request in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Default capacity of the progress event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Suffix of the temporary file a download is written to.
pub const DOWNLOAD_EXTENSION: &str = ".ptdownload";

/// How a range worker reacts to transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive attempts without progress before the worker gives up.
    ///
    /// `1` means never retry in-process and leave the rest to the next run.
    pub max_attempts: u32,

    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A policy that re-issues the unfinished range after `delay`.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Give up on the first transport error.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(10))
    }
}

/// Configuration for a download coordinator.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Size of one resumable chunk and of the streaming buffer.
    pub chunk_size: u64,

    /// Range workers per file.
    pub workers: usize,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Retry behaviour for transport errors.
    pub retry: RetryPolicy,

    /// Capacity of the progress event channel.
    pub event_buffer: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl DownloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk size (minimum 1 byte).
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the number of range workers (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the progress channel capacity.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }
}

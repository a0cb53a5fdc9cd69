//! Resumable multi-connection file downloads.
//!
//! A file is split into one contiguous byte range per worker and every
//! worker streams its range with HTTP `Range` requests into a shared temp
//! file. Completed chunks are tracked in a [`ProgressBitmap`] persisted
//! right after the payload, so an interrupted transfer resumes at chunk
//! granularity. The file is renamed into place only once every chunk is
//! present.
//!
//! # Example
//!
//! ```ignore
//! use putsync::download::{Coordinator, DownloadConfig};
//!
//! let coordinator = Coordinator::http(DownloadConfig::default())?;
//! let outcome = coordinator.run_job(&file, &url, Path::new("/data/movie.mkv"))?;
//! ```

mod bitmap;
mod config;
mod coordinator;
mod error;
mod fetcher;
mod job;
mod progress;
mod range;
mod source;

pub use bitmap::ProgressBitmap;
pub use config::{
    DownloadConfig, RetryPolicy, DEFAULT_CHUNK_SIZE, DEFAULT_EVENT_BUFFER, DEFAULT_WORKERS,
    DOWNLOAD_EXTENSION,
};
pub use coordinator::{Coordinator, JobOutcome};
pub use error::{DownloadError, DownloadResult};
pub use fetcher::{RangeFetcher, RangeOutcome};
pub use job::{temp_path_for, DownloadJob, JobStart};
pub use progress::{
    progress_channel, ProgressAggregator, ProgressCallback, ProgressEvent, ProgressReporter,
    ProgressSink, ProgressSnapshot,
};
pub use range::{partition, ChunkLayout, RangeAssignment};
pub use source::{HttpRangeSource, RangeBody, RangeSource};

#[cfg(test)]
pub(crate) use source::tests::{Fault, MockRangeSource};

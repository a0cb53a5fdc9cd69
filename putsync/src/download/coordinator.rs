//! Per-file download coordination.
//!
//! The [`Coordinator`] owns one file transfer at a time:
//!
//! 1. Open or create the temp file ([`DownloadJob::open`])
//! 2. Split `[0, size)` into one range per worker, reusing the split a
//!    resumed temp file was written with
//! 3. On resume, shrink each range to its first missing chunk or drop it
//! 4. Run one [`RangeFetcher`] per range on scoped threads and join them all
//! 5. Finalize when the bitmap has no gaps, otherwise leave the temp file
//!    for the next run

use std::path::Path;
use std::thread;

use tokio_util::sync::CancellationToken;

use super::bitmap::ProgressBitmap;
use super::config::DownloadConfig;
use super::error::{DownloadError, DownloadResult};
use super::fetcher::{RangeFetcher, RangeOutcome};
use super::job::{DownloadJob, JobStart};
use super::progress::{ProgressEvent, ProgressSink};
use super::range::{partition, ChunkLayout, RangeAssignment};
use super::source::{HttpRangeSource, RangeSource};
use crate::remote::FileDescriptor;

/// Result of a job that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The file is at its final path with exactly `bytes` bytes.
    ///
    /// `chunks` is the bitmap as it was just before finalizing.
    Finalized { bytes: u64, chunks: ProgressBitmap },
    /// Some chunks are still missing; the temp file stays for a later run.
    Incomplete {
        missing_chunks: u64,
        first_missing: u64,
    },
}

impl JobOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, JobOutcome::Finalized { .. })
    }
}

/// Runs resumable multi-range downloads.
pub struct Coordinator<S: RangeSource> {
    source: S,
    config: DownloadConfig,
    events: ProgressSink,
    cancel: CancellationToken,
}

impl Coordinator<HttpRangeSource> {
    /// Coordinator backed by a real HTTP client.
    pub fn http(config: DownloadConfig) -> DownloadResult<Self> {
        let source = HttpRangeSource::new(config.timeout)?;
        Ok(Self::new(source, config))
    }
}

impl<S: RangeSource> Coordinator<S> {
    pub fn new(source: S, config: DownloadConfig) -> Self {
        Self {
            source,
            config,
            events: ProgressSink::disabled(),
            cancel: CancellationToken::new(),
        }
    }

    /// Send progress events to `events`.
    pub fn with_events(mut self, events: ProgressSink) -> Self {
        self.events = events;
        self
    }

    /// Stop workers when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Download `file` from `url` to `dest`, resuming any earlier attempt.
    ///
    /// Returns `Err` when the temp file cannot be set up, a worker hits a
    /// local write error, the job is cancelled, or the final rename fails.
    /// Transport trouble that outlasts the retry policy is not an error:
    /// the job comes back [`JobOutcome::Incomplete`].
    pub fn run_job(
        &self,
        file: &FileDescriptor,
        url: &str,
        dest: &Path,
    ) -> DownloadResult<JobOutcome> {
        let layout = ChunkLayout::new(file.size, self.config.chunk_size);
        let job = DownloadJob::open(dest, layout, self.config.workers)?;

        match job.start() {
            JobStart::Fresh => {
                tracing::info!(file = %file.name, size = file.size, "Downloading");
            }
            JobStart::Resuming => {
                tracing::info!(
                    file = %file.name,
                    size = file.size,
                    done_chunks = job.bitmap().count_set(),
                    total_chunks = layout.total_chunks(),
                    "Resuming"
                );
            }
        }
        self.events.emit(ProgressEvent::FileSize(file.size));

        let assignments = self.plan(&job);
        tracing::debug!(
            file = %file.name,
            workers = assignments.len(),
            "Range plan ready"
        );

        self.run_workers(&job, url, &assignments)?;

        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        self.complete(file, job)
    }

    /// Ranges that still need work.
    fn plan(&self, job: &DownloadJob) -> Vec<RangeAssignment> {
        let layout = job.layout();
        if layout.size() == 0 {
            return Vec::new();
        }

        let ranges = partition(layout.size(), job.workers())
            .into_iter()
            .filter(|range| !range.is_empty());

        match job.start() {
            JobStart::Fresh => ranges.collect(),
            JobStart::Resuming => {
                let bitmap = job.bitmap();
                ranges
                    .filter_map(|range| layout.resume(&range, &bitmap))
                    .collect()
            }
        }
    }

    /// Run one fetcher per range and wait for all of them.
    ///
    /// The first fatal error is returned only after every worker is joined.
    fn run_workers(
        &self,
        job: &DownloadJob,
        url: &str,
        assignments: &[RangeAssignment],
    ) -> DownloadResult<()> {
        let results: Vec<DownloadResult<RangeOutcome>> = thread::scope(|s| {
            let handles: Vec<_> = assignments
                .iter()
                .map(|&range| {
                    let fetcher = RangeFetcher::new(
                        &self.source,
                        job,
                        url,
                        self.config.retry,
                        &self.events,
                        &self.cancel,
                    );
                    s.spawn(move || fetcher.run(range))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or(Err(DownloadError::WorkerPanicked))
                })
                .collect()
        });

        let mut fatal = None;
        for result in results {
            match result {
                Ok(RangeOutcome::Complete { .. }) => {}
                Ok(RangeOutcome::Abandoned { remaining, .. }) => {
                    tracing::debug!(
                        offset = remaining.offset,
                        length = remaining.length,
                        "Range left for next run"
                    );
                }
                Err(e) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        match fatal {
            Some(DownloadError::Cancelled) => {
                tracing::info!(path = %job.dest().display(), "Download cancelled");
                Err(DownloadError::Cancelled)
            }
            Some(e) => {
                tracing::error!(path = %job.dest().display(), error = %e, "Download failed");
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Finalize when every chunk is present, otherwise defer.
    fn complete(&self, file: &FileDescriptor, job: DownloadJob) -> DownloadResult<JobOutcome> {
        if let Some(first_missing) = job.first_missing() {
            let total = job.layout().total_chunks();
            let missing_chunks = total - job.bitmap().count_set();
            tracing::info!(
                file = %file.name,
                missing_chunks,
                total_chunks = total,
                "Download incomplete, will resume on next run"
            );
            return Ok(JobOutcome::Incomplete {
                missing_chunks,
                first_missing,
            });
        }

        let chunks = job.bitmap();
        match job.finalize() {
            Ok(bytes) => {
                tracing::info!(file = %file.name, bytes, "Download complete");
                Ok(JobOutcome::Finalized { bytes, chunks })
            }
            Err(e) => {
                tracing::error!(file = %file.name, error = %e, "Failed to finalize download");
                Err(e)
            }
        }
    }
}

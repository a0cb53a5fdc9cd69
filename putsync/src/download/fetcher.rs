//! One worker's transfer of one byte range.
//!
//! The fetcher streams the range into the job's temp file one buffer at a
//! time, recording completed chunks as it goes. Transport failures re-issue
//! the unfinished tail after a pause; local write failures and cancellation
//! end the range immediately.

use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::config::RetryPolicy;
use super::error::{DownloadError, DownloadResult};
use super::job::DownloadJob;
use super::progress::{ProgressEvent, ProgressSink};
use super::range::RangeAssignment;
use super::source::{display_url, RangeSource};

/// Granularity of cancellation checks while backing off.
const BACKOFF_SLICE: Duration = Duration::from_millis(100);

/// How a range ended when no fatal error occurred.
#[derive(Debug)]
pub enum RangeOutcome {
    /// Every byte of the range is on disk.
    Complete { bytes: u64 },
    /// Retries ran out. `remaining` is what is still missing.
    Abandoned {
        remaining: RangeAssignment,
        error: DownloadError,
    },
}

/// Streams a single range from a [`RangeSource`] into a [`DownloadJob`].
pub struct RangeFetcher<'a, S: RangeSource + ?Sized> {
    source: &'a S,
    job: &'a DownloadJob,
    url: &'a str,
    retry: RetryPolicy,
    events: &'a ProgressSink,
    cancel: &'a CancellationToken,
}

impl<'a, S: RangeSource + ?Sized> RangeFetcher<'a, S> {
    pub fn new(
        source: &'a S,
        job: &'a DownloadJob,
        url: &'a str,
        retry: RetryPolicy,
        events: &'a ProgressSink,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            source,
            job,
            url,
            retry,
            events,
            cancel,
        }
    }

    /// Transfer `range`, retrying transport errors per the policy.
    ///
    /// Returns `Err` only for errors that retrying cannot fix: local I/O
    /// failures and cancellation.
    pub fn run(&self, range: RangeAssignment) -> DownloadResult<RangeOutcome> {
        let end = range.end();
        let mut cursor = range.offset;
        let mut failures = 0u32;
        let mut buffer = vec![0u8; self.job.layout().chunk_size() as usize];

        self.events.emit(ProgressEvent::Scheduled(range.length));
        tracing::debug!(offset = range.offset, length = range.length, "Range started");

        while cursor < end {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let before = cursor;
            let error = match self.transfer(&mut cursor, end, &mut buffer) {
                Ok(()) => continue,
                Err(e) if e.is_transport() => e,
                Err(e) => return Err(e),
            };

            // Only attempts that made no progress count against the budget.
            if cursor > before {
                failures = 0;
            }
            failures += 1;

            if failures >= self.retry.max_attempts {
                tracing::warn!(
                    offset = cursor,
                    remaining = end - cursor,
                    attempts = failures,
                    error = %error,
                    "Giving up on range"
                );
                return Ok(RangeOutcome::Abandoned {
                    remaining: RangeAssignment::new(cursor, end - cursor),
                    error,
                });
            }

            tracing::warn!(
                offset = cursor,
                remaining = end - cursor,
                attempt = failures,
                delay_ms = self.retry.delay.as_millis() as u64,
                error = %error,
                "Range interrupted, retrying"
            );
            self.back_off()?;
        }

        tracing::debug!(offset = range.offset, length = range.length, "Range complete");
        Ok(RangeOutcome::Complete {
            bytes: range.length,
        })
    }

    /// One request for `[cursor, end)`. Advances `cursor` past every byte
    /// that reached the disk, even when the request fails part-way.
    fn transfer(&self, cursor: &mut u64, end: u64, buffer: &mut [u8]) -> DownloadResult<()> {
        let mut body = self.source.fetch(self.url, *cursor, end - 1)?;

        while *cursor < end {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let want = (end - *cursor).min(buffer.len() as u64) as usize;
            let (filled, read_error) = fill(&mut body, &mut buffer[..want]);

            if filled > 0 {
                self.commit(*cursor, &buffer[..filled], end)?;
                *cursor += filled as u64;
            }

            if let Some(e) = read_error {
                return Err(DownloadError::Read {
                    url: display_url(self.url),
                    source: e,
                });
            }

            if filled < want {
                return Err(DownloadError::PrematureEof {
                    url: display_url(self.url),
                    received: *cursor,
                    expected: end,
                });
            }
        }

        Ok(())
    }

    fn commit(&self, offset: u64, data: &[u8], range_end: u64) -> DownloadResult<()> {
        self.job.write_at(offset, data)?;
        self.job
            .record_written(offset, offset + data.len() as u64, range_end)?;
        self.events.emit(ProgressEvent::Written(data.len() as u64));
        Ok(())
    }

    fn back_off(&self) -> DownloadResult<()> {
        let mut waited = Duration::ZERO;
        while waited < self.retry.delay {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            let slice = BACKOFF_SLICE.min(self.retry.delay - waited);
            thread::sleep(slice);
            waited += slice;
        }
        Ok(())
    }
}

/// Read until `buf` is full, the body ends, or it fails.
///
/// Returns the number of bytes read alongside the error that stopped it.
fn fill(body: &mut impl Read, buf: &mut [u8]) -> (usize, Option<io::Error>) {
    let mut filled = 0;
    while filled < buf.len() {
        match body.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}

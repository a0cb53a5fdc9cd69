//! Progress events and their aggregation.
//!
//! Workers emit immutable [`ProgressEvent`]s through a [`ProgressSink`].
//! The sink is best-effort: a full or abandoned channel drops events
//! instead of stalling the transfer. A [`ProgressReporter`] owns the
//! receiving end, folds events into a [`ProgressAggregator`] on a
//! background thread and hands snapshots to a callback at a fixed
//! interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One progress observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A worker started on a range of this many bytes.
    Scheduled(u64),
    /// This many new bytes reached the disk.
    Written(u64),
    /// A job started for a file of this size.
    FileSize(u64),
}

/// Best-effort sending half of the progress channel.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    sender: Option<SyncSender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Send an event without blocking. Dropped if nobody keeps up.
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            match sender.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(?event, "Progress channel full, dropping event");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

/// Create a bounded progress channel.
pub fn progress_channel(capacity: usize) -> (ProgressSink, Receiver<ProgressEvent>) {
    let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
    (
        ProgressSink {
            sender: Some(sender),
        },
        receiver,
    )
}

/// Totals observed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Bytes workers were asked to fetch.
    pub bytes_scheduled: u64,
    /// Bytes written to disk.
    pub bytes_written: u64,
    /// Sum of the sizes of files whose jobs started.
    pub file_bytes: u64,
    /// Number of jobs started.
    pub files: u64,
}

impl ProgressSnapshot {
    /// Written bytes as a percentage of scheduled bytes.
    pub fn percent(&self) -> f64 {
        if self.bytes_scheduled == 0 {
            100.0
        } else {
            (self.bytes_written as f64 / self.bytes_scheduled as f64) * 100.0
        }
    }
}

/// Folds events into running totals.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    totals: ProgressSnapshot,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Scheduled(bytes) => self.totals.bytes_scheduled += bytes,
            ProgressEvent::Written(bytes) => self.totals.bytes_written += bytes,
            ProgressEvent::FileSize(bytes) => {
                self.totals.file_bytes += bytes;
                self.totals.files += 1;
            }
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.totals
    }
}

/// Callback receiving periodic snapshots.
pub type ProgressCallback = Box<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Background reader of the progress channel.
///
/// Stops when every sink is dropped, on [`ProgressReporter::stop`], or on
/// drop. The callback always sees one final snapshot.
pub struct ProgressReporter {
    handle: Option<JoinHandle<ProgressSnapshot>>,
    done: Arc<AtomicBool>,
}

impl ProgressReporter {
    /// Start draining `receiver`, reporting every `interval`.
    pub fn start(
        receiver: Receiver<ProgressEvent>,
        callback: ProgressCallback,
        interval: Duration,
    ) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = Arc::clone(&done);

        let handle = thread::spawn(move || {
            let mut aggregator = ProgressAggregator::new();
            let mut last_report = Instant::now();

            while !done_clone.load(Ordering::SeqCst) {
                match receiver.recv_timeout(interval) {
                    Ok(event) => aggregator.apply(event),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if last_report.elapsed() >= interval {
                    callback(aggregator.snapshot());
                    last_report = Instant::now();
                }
            }

            // Final report
            while let Ok(event) = receiver.try_recv() {
                aggregator.apply(event);
            }
            let snapshot = aggregator.snapshot();
            callback(snapshot);
            snapshot
        });

        Self {
            handle: Some(handle),
            done,
        }
    }

    /// Start a reporter with default 100ms interval.
    pub fn start_default(receiver: Receiver<ProgressEvent>, callback: ProgressCallback) -> Self {
        Self::start(receiver, callback, Duration::from_millis(100))
    }

    /// Stop the reporter and return the final totals.
    pub fn stop(mut self) -> ProgressSnapshot {
        self.done.store(true, Ordering::SeqCst);
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_aggregator_totals() {
        let mut aggregator = ProgressAggregator::new();
        aggregator.apply(ProgressEvent::FileSize(1000));
        aggregator.apply(ProgressEvent::Scheduled(600));
        aggregator.apply(ProgressEvent::Scheduled(400));
        aggregator.apply(ProgressEvent::Written(250));

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.files, 1);
        assert_eq!(snapshot.file_bytes, 1000);
        assert_eq!(snapshot.bytes_scheduled, 1000);
        assert_eq!(snapshot.bytes_written, 250);
        assert_eq!(snapshot.percent(), 25.0);
    }

    #[test]
    fn test_percent_with_nothing_scheduled() {
        assert_eq!(ProgressSnapshot::default().percent(), 100.0);
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        let sink = ProgressSink::disabled();
        sink.emit(ProgressEvent::Written(1));
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (sink, receiver) = progress_channel(2);
        for _ in 0..10 {
            sink.emit(ProgressEvent::Written(1));
        }
        let received: Vec<_> = receiver.try_iter().collect();
        assert_eq!(received.len(), 2);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (sink, receiver) = progress_channel(2);
        drop(receiver);
        sink.emit(ProgressEvent::Written(1));
    }

    #[test]
    fn test_reporter_final_snapshot_after_senders_drop() {
        let (sink, receiver) = progress_channel(64);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let reporter = ProgressReporter::start(
            receiver,
            Box::new(move |_snapshot| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(10),
        );

        sink.emit(ProgressEvent::Scheduled(10));
        sink.emit(ProgressEvent::Written(4));
        sink.emit(ProgressEvent::Written(6));
        drop(sink);

        let snapshot = reporter.stop();
        assert_eq!(snapshot.bytes_written, 10);
        assert_eq!(snapshot.bytes_scheduled, 10);
        assert!(calls.load(Ordering::SeqCst) > 0);
    }
}

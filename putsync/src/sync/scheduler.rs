//! Periodic re-scan loop.

use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Default pause between passes over the remote tree.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// How often the wait between passes looks at the cancellation token.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs a pass, waits, and repeats until cancelled.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(interval: Duration, cancel: CancellationToken) -> Self {
        Self { interval, cancel }
    }

    /// Call `pass` with the pass number until the token is cancelled.
    ///
    /// A pass in progress always runs to its end. Returns the number of
    /// passes made.
    pub fn run<F>(&self, mut pass: F) -> usize
    where
        F: FnMut(usize),
    {
        let mut passes = 0;
        while !self.cancel.is_cancelled() {
            pass(passes);
            passes += 1;

            if !self.wait() {
                break;
            }
        }
        passes
    }

    /// Sleep for the interval. Returns `false` if cancelled meanwhile.
    fn wait(&self) -> bool {
        let deadline = Instant::now() + self.interval;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_until_cancelled() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(Duration::ZERO, cancel.clone());

        let mut seen = Vec::new();
        let passes = scheduler.run(|n| {
            seen.push(n);
            if n == 2 {
                cancel.cancel();
            }
        });

        assert_eq!(passes, 3);
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_cancelled_before_first_pass() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let passes = Scheduler::new(Duration::ZERO, cancel).run(|_| {});
        assert_eq!(passes, 0);
    }

    #[test]
    fn test_cancel_cuts_wait_short() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(Duration::from_secs(60), cancel.clone());

        let start = Instant::now();
        let passes = thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                cancel.cancel();
            });
            scheduler.run(|_| {})
        });

        assert_eq!(passes, 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}

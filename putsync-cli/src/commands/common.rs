//! Common types and utilities shared across CLI commands.

use std::time::Duration;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use putsync::config::ConfigFile;
use putsync::download::{
    progress_channel, DownloadConfig, ProgressReporter, ProgressSink, ProgressSnapshot,
    RetryPolicy,
};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Download tuning flags shared by all commands.
#[derive(Debug, Clone, Default, Args)]
pub struct DownloadArgs {
    /// Simultaneous connections per file
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Resume granularity in bytes
    #[arg(long, global = true)]
    pub chunk_size: Option<u64>,

    /// Attempts per range without progress before deferring to the next run (1 = no retry)
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Seconds to wait between attempts
    #[arg(long, global = true)]
    pub retry_delay: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

impl DownloadArgs {
    /// Merge flags over config file values. Flags win.
    pub fn resolve(&self, config: &ConfigFile) -> DownloadConfig {
        let file = &config.download;
        let attempts = self.retries.unwrap_or(file.max_attempts);
        let delay = self.retry_delay.unwrap_or(file.retry_delay_secs);

        config
            .download_config()
            .with_workers(self.workers.unwrap_or(file.workers))
            .with_chunk_size(self.chunk_size.unwrap_or(file.chunk_size))
            .with_timeout(Duration::from_secs(
                self.timeout.unwrap_or(file.timeout_secs),
            ))
            .with_retry(RetryPolicy::new(attempts, Duration::from_secs(delay)))
    }
}

/// Token cancelled on Ctrl+C.
pub fn shutdown_token() -> Result<CancellationToken, CliError> {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    ctrlc::set_handler(move || {
        if !handler_token.is_cancelled() {
            eprintln!();
            eprintln!("Received shutdown signal, stopping downloads...");
            handler_token.cancel();
        }
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    Ok(token)
}

/// Progress bar fed by a [`ProgressReporter`].
pub struct ProgressDisplay {
    reporter: ProgressReporter,
    bar: ProgressBar,
}

impl ProgressDisplay {
    /// Start the display; events sent to the returned sink show up on it.
    pub fn start(buffer: usize) -> (ProgressSink, Self) {
        let (sink, receiver) = progress_channel(buffer);

        let bar = ProgressBar::new(0);
        bar.set_style(bar_style());

        let shown = bar.clone();
        let reporter = ProgressReporter::start_default(
            receiver,
            Box::new(move |snapshot| {
                shown.set_length(snapshot.bytes_scheduled);
                shown.set_position(snapshot.bytes_written);
                shown.set_message(format!("{} file(s)", snapshot.files));
            }),
        );

        (sink, Self { reporter, bar })
    }

    /// Stop updating and clear the bar. Returns the final totals.
    pub fn finish(self) -> ProgressSnapshot {
        let snapshot = self.reporter.stop();
        self.bar.finish_and_clear();
        snapshot
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
    )
    .map(|style| style.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Format a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

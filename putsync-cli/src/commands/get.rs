//! Get command - download a single URL with resume support.

use std::path::PathBuf;

use clap::Args;
use putsync::download::{Coordinator, HttpRangeSource, JobOutcome};
use putsync::remote::FileDescriptor;

use super::common::{format_size, shutdown_token, DownloadArgs, ProgressDisplay};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the get command.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// URL serving byte ranges
    pub url: String,

    /// Destination file
    pub dest: PathBuf,

    /// File size in bytes (asked with HEAD when omitted)
    #[arg(long)]
    pub size: Option<u64>,
}

/// Run the get command.
pub fn run(args: GetArgs, download: &DownloadArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("get");
    let config = download.resolve(runner.config());

    let source = HttpRangeSource::new(config.timeout)?;
    let size = match args.size {
        Some(size) => size,
        None => source.content_length(&args.url)?,
    };

    let name = args
        .dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let file = FileDescriptor::file(0, name, size);

    let cancel = shutdown_token()?;
    let (events, display) = ProgressDisplay::start(config.event_buffer);
    let coordinator = Coordinator::new(source, config)
        .with_events(events)
        .with_cancellation(cancel);

    let config = coordinator.config();
    println!("Downloading {} ({})", args.dest.display(), format_size(size));
    println!("  Workers:    {}", config.workers);
    println!("  Chunk size: {}", format_size(config.chunk_size));
    println!();

    let outcome = coordinator.run_job(&file, &args.url, &args.dest);
    drop(coordinator);
    display.finish();

    match outcome? {
        JobOutcome::Finalized { bytes, .. } => {
            println!("Saved {} ({})", args.dest.display(), format_size(bytes));
            Ok(())
        }
        JobOutcome::Incomplete { missing_chunks, .. } => {
            Err(CliError::Incomplete { missing_chunks })
        }
    }
}

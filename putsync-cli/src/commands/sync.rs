//! Sync command - mirror a put.io folder into a local directory.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use putsync::config::{ConfigFile, SyncConfig};
use putsync::download::Coordinator;
use putsync::remote::PutioClient;
use putsync::sync::{Scheduler, WalkSummary, Walker};

use super::common::{format_size, shutdown_token, DownloadArgs, ProgressDisplay};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the sync command.
#[derive(Debug, Clone, Default, Args)]
pub struct SyncArgs {
    /// OAuth token for the put.io API
    #[arg(long, env = "PUTIO_OAUTH_TOKEN", hide_env_values = true)]
    pub oauth_token: Option<String>,

    /// put.io folder name under your root
    #[arg(long)]
    pub putio_folder: Option<String>,

    /// Local folder to fill
    #[arg(long)]
    pub local_path: Option<PathBuf>,

    /// Minutes between checks of the remote folder
    #[arg(long)]
    pub check_minutes: Option<u64>,

    /// Make one pass and exit
    #[arg(long)]
    pub once: bool,
}

impl SyncArgs {
    /// Merge flags over config file values. Flags win.
    pub fn resolve(&self, config: &ConfigFile) -> SyncConfig {
        let mut sync = config.sync_config();
        if let Some(token) = &self.oauth_token {
            sync.oauth_token = token.clone();
        }
        if let Some(folder) = &self.putio_folder {
            sync.remote_folder = folder.clone();
        }
        if let Some(path) = &self.local_path {
            sync.local_path = path.clone();
        }
        if let Some(minutes) = self.check_minutes {
            sync.check_interval = Duration::from_secs(minutes * 60);
        }
        sync
    }
}

/// Run the sync command.
pub fn run(args: SyncArgs, download: &DownloadArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("sync");
    let sync = args.resolve(runner.config());
    sync.validate()?;
    let download_config = download.resolve(runner.config());

    let client = PutioClient::with_base_url(&sync.api_url, sync.oauth_token.as_str())?;
    let folder_id = client.ensure_folder(&sync.remote_folder)?;

    println!("putsync v{}", putsync::VERSION);
    println!("=============");
    println!();
    println!("Remote folder: {} (id {})", sync.remote_folder, folder_id);
    println!("Local folder:  {}", sync.local_path.display());
    println!("Workers:       {}", download_config.workers);
    if !args.once {
        println!("Check every:   {} min", sync.check_interval.as_secs() / 60);
        println!();
        println!("Press Ctrl+C to stop");
    }
    println!();

    let cancel = shutdown_token()?;
    let (events, display) = ProgressDisplay::start(download_config.event_buffer);
    let coordinator = Coordinator::http(download_config)?
        .with_events(events)
        .with_cancellation(cancel.clone());
    let walker = Walker::new(&client, &coordinator);

    let mut total = WalkSummary::default();
    if args.once {
        total = walker.walk(folder_id, &sync.local_path);
    } else {
        Scheduler::new(sync.check_interval, cancel.clone()).run(|pass| {
            let summary = walker.walk(folder_id, &sync.local_path);
            if summary.is_idle() {
                tracing::debug!(pass, skipped = summary.skipped, "Nothing new on remote");
            } else {
                tracing::info!(
                    pass,
                    finalized = summary.finalized,
                    incomplete = summary.incomplete,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    "Pass complete"
                );
            }
            total += summary;
        });
    }

    drop(walker);
    drop(coordinator);
    let progress = display.finish();

    println!();
    println!("Session Summary");
    println!("───────────────");
    println!("  Downloaded: {} file(s)", total.finalized);
    println!("  Incomplete: {} file(s)", total.incomplete);
    println!("  Failed:     {}", total.failed);
    println!("  Data:       {}", format_size(progress.bytes_written));

    if cancel.is_cancelled() {
        return Err(CliError::Interrupted);
    }
    Ok(())
}

//! putsync CLI - Command-line interface
//!
//! Mirrors a put.io folder into a local directory, or downloads a single
//! URL, using the resumable multi-connection downloader of the library.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::common::DownloadArgs;
use commands::get::GetArgs;
use commands::sync::SyncArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "putsync", author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/putsync/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file, rotated daily
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    download: DownloadArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Keep a local folder in sync with a put.io folder (default)
    Sync(SyncArgs),

    /// Download one URL, resuming any earlier attempt
    Get(GetArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let runner = CliRunner::new(cli.config.as_deref(), cli.log_file.as_deref())?;

    match cli.command.unwrap_or_else(|| Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => commands::sync::run(args, &cli.download, &runner),
        Commands::Get(args) => commands::get::run(args, &cli.download, &runner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_get_with_global_flags() {
        let cli = Cli::try_parse_from([
            "putsync",
            "get",
            "https://example.test/file.bin",
            "/tmp/file.bin",
            "--size",
            "1000",
            "--workers",
            "4",
        ])
        .unwrap();

        assert_eq!(cli.download.workers, Some(4));
        match cli.command {
            Some(Commands::Get(args)) => {
                assert_eq!(args.url, "https://example.test/file.bin");
                assert_eq!(args.size, Some(1000));
            }
            other => panic!("expected get command, got {:?}", other),
        }
    }

    #[test]
    fn test_no_subcommand_means_sync() {
        let cli = Cli::try_parse_from(["putsync", "--retries", "1"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.download.retries, Some(1));
    }
}

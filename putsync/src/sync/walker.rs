//! Recursive remote-to-local tree walk.
//!
//! The walker mirrors one remote folder into one local directory. Every
//! remote file without a local counterpart is handed to the download
//! coordinator; every remote folder is walked on its own scoped thread.
//! All child walks are joined before [`Walker::walk`] returns, so a
//! summary always covers the whole subtree.

use std::fs;
use std::ops::AddAssign;
use std::path::Path;
use std::thread;

use crate::download::{Coordinator, DownloadError, JobOutcome, RangeSource};
use crate::remote::{FileDescriptor, RemoteTree};

/// Counts from one pass over a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Files downloaded and renamed into place.
    pub finalized: usize,
    /// Files left partially downloaded for the next pass.
    pub incomplete: usize,
    /// Files or folders that failed this pass.
    pub failed: usize,
    /// Files already present locally.
    pub skipped: usize,
}

impl WalkSummary {
    /// Whether the pass touched nothing.
    pub fn is_idle(&self) -> bool {
        self.finalized == 0 && self.incomplete == 0 && self.failed == 0
    }
}

impl AddAssign for WalkSummary {
    fn add_assign(&mut self, other: Self) {
        self.finalized += other.finalized;
        self.incomplete += other.incomplete;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Walks a [`RemoteTree`] and downloads what is missing locally.
pub struct Walker<'a, T: RemoteTree, S: RangeSource> {
    remote: &'a T,
    coordinator: &'a Coordinator<S>,
}

impl<'a, T: RemoteTree, S: RangeSource> Walker<'a, T, S> {
    pub fn new(remote: &'a T, coordinator: &'a Coordinator<S>) -> Self {
        Self {
            remote,
            coordinator,
        }
    }

    /// Mirror remote folder `parent_id` into `local_dir`.
    ///
    /// Failures are logged and counted, never propagated: a folder that
    /// cannot be created or listed is retried on the next pass.
    pub fn walk(&self, parent_id: i64, local_dir: &Path) -> WalkSummary {
        tracing::info!(path = %local_dir.display(), "Walking");

        if let Err(e) = fs::create_dir_all(local_dir) {
            tracing::warn!(path = %local_dir.display(), error = %e, "Failed to create local folder");
            return WalkSummary {
                failed: 1,
                ..Default::default()
            };
        }

        let entries = match self.remote.list(parent_id) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(folder = parent_id, error = %e, "Failed to list remote folder");
                return WalkSummary {
                    failed: 1,
                    ..Default::default()
                };
            }
        };

        let (dirs, files): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .filter(|entry| {
                let safe = entry.has_safe_name();
                if !safe {
                    tracing::warn!(name = %entry.name, id = entry.id, "Skipping entry with unusable name");
                }
                safe
            })
            .partition(FileDescriptor::is_dir);

        thread::scope(|s| {
            let children: Vec<_> = dirs
                .iter()
                .map(|dir| {
                    let path = local_dir.join(&dir.name);
                    s.spawn(move || self.walk(dir.id, &path))
                })
                .collect();

            let mut summary = WalkSummary::default();
            for file in &files {
                if self.coordinator.cancel_token().is_cancelled() {
                    break;
                }
                summary += self.sync_file(file, local_dir);
            }

            for child in children {
                match child.join() {
                    Ok(child_summary) => summary += child_summary,
                    Err(_) => {
                        tracing::error!(path = %local_dir.display(), "Folder walk panicked");
                        summary.failed += 1;
                    }
                }
            }

            summary
        })
    }

    fn sync_file(&self, file: &FileDescriptor, local_dir: &Path) -> WalkSummary {
        let dest = local_dir.join(&file.name);
        if dest.exists() {
            return WalkSummary {
                skipped: 1,
                ..Default::default()
            };
        }

        let url = match self.remote.download_url(file) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "Failed to build download URL");
                return WalkSummary {
                    failed: 1,
                    ..Default::default()
                };
            }
        };

        match self.coordinator.run_job(file, &url, &dest) {
            Ok(JobOutcome::Finalized { .. }) => WalkSummary {
                finalized: 1,
                ..Default::default()
            },
            Ok(JobOutcome::Incomplete { .. }) | Err(DownloadError::Cancelled) => WalkSummary {
                incomplete: 1,
                ..Default::default()
            },
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "Download failed, will retry next pass");
                WalkSummary {
                    failed: 1,
                    ..Default::default()
                }
            }
        }
    }
}

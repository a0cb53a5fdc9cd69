//! Keeping a local directory in step with a remote folder.
//!
//! [`Walker`] performs one pass over the remote tree; [`Scheduler`] repeats
//! passes at a fixed interval until cancelled.

mod scheduler;
mod walker;

pub use scheduler::{Scheduler, DEFAULT_CHECK_INTERVAL};
pub use walker::{WalkSummary, Walker};

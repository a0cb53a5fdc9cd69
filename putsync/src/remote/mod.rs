//! Remote file service access.
//!
//! [`RemoteTree`] is what the sync walker needs from the service: folder
//! listings and download URLs. [`PutioClient`] implements it against the
//! put.io v2 API.

mod client;
mod error;
mod types;

pub use client::{redact_url, PutioClient, RemoteTree, DEFAULT_API_URL};
pub use error::{RemoteError, RemoteResult};
pub use types::{FileDescriptor, DIRECTORY_CONTENT_TYPE, ROOT_FOLDER_ID};

//! put.io API client.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::de::DeserializeOwned;

use super::error::{RemoteError, RemoteResult};
use super::types::{FileDescriptor, FileResponse, FilesResponse, ROOT_FOLDER_ID};

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://api.put.io/v2/";

/// Default timeout for API calls in seconds.
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Read access to a remote folder tree.
///
/// Allows the walker to be driven by an in-memory tree in tests.
pub trait RemoteTree: Send + Sync {
    /// Children of the folder `parent_id`.
    fn list(&self, parent_id: i64) -> RemoteResult<Vec<FileDescriptor>>;

    /// URL serving the bytes of `file`.
    fn download_url(&self, file: &FileDescriptor) -> RemoteResult<String>;
}

/// Blocking client for the put.io v2 API.
#[derive(Debug, Clone)]
pub struct PutioClient {
    client: Client,
    base: Url,
    token: String,
}

impl PutioClient {
    /// Client for the public API.
    pub fn new(token: impl Into<String>) -> RemoteResult<Self> {
        Self::with_base_url(DEFAULT_API_URL, token)
    }

    /// Client for an API at `base_url`.
    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> RemoteResult<Self> {
        // Relative joins only keep the last path segment with a trailing slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        let base = Url::parse(&normalized).map_err(|e| RemoteError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_API_TIMEOUT_SECS))
            .build()
            .map_err(RemoteError::Client)?;

        Ok(Self {
            client,
            base,
            token: token.into(),
        })
    }

    /// Authenticated URL for an API method.
    fn endpoint(&self, method: &str, params: &[(&str, String)]) -> RemoteResult<Url> {
        let mut url = self.base.join(method).map_err(|e| RemoteError::InvalidUrl {
            url: method.to_string(),
            reason: e.to_string(),
        })?;

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("oauth_token", &self.token);
        }

        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> RemoteResult<T> {
        let shown = redact_url(url);
        let response = request.send().map_err(|e| RemoteError::Request {
            url: shown.clone(),
            source: e.without_url(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: shown,
                status: status.as_u16(),
            });
        }

        response.json::<T>().map_err(|e| RemoteError::Decode {
            url: shown,
            source: e.without_url(),
        })
    }

    /// Create a folder named `name` under `parent_id`.
    pub fn create_folder(&self, name: &str, parent_id: i64) -> RemoteResult<FileDescriptor> {
        let url = self.endpoint("files/create-folder", &[])?;
        let parent = parent_id.to_string();
        let request = self
            .client
            .post(url.clone())
            .form(&[("name", name), ("parent_id", parent.as_str())]);

        let response: FileResponse = self.send(request, &url)?;
        tracing::info!(folder = name, id = response.file.id, "Created remote folder");
        Ok(response.file)
    }

    /// Id of the root-level folder `name`, creating it when absent.
    pub fn ensure_folder(&self, name: &str) -> RemoteResult<i64> {
        let existing = self
            .list(ROOT_FOLDER_ID)?
            .into_iter()
            .find(|file| file.is_dir() && file.name == name);

        match existing {
            Some(folder) => {
                tracing::info!(folder = name, id = folder.id, "Found remote folder");
                Ok(folder.id)
            }
            None => self
                .create_folder(name, ROOT_FOLDER_ID)
                .map(|folder| folder.id),
        }
    }
}

impl RemoteTree for PutioClient {
    fn list(&self, parent_id: i64) -> RemoteResult<Vec<FileDescriptor>> {
        let url = self.endpoint("files/list", &[("parent_id", parent_id.to_string())])?;
        let request = self.client.get(url.clone());
        let response: FilesResponse = self.send(request, &url)?;
        Ok(response.files)
    }

    fn download_url(&self, file: &FileDescriptor) -> RemoteResult<String> {
        let method = format!("files/{}/download", file.id);
        Ok(self.endpoint(&method, &[])?.to_string())
    }
}

/// URL without its query string, for logs and errors.
///
/// API URLs carry the OAuth token as a query parameter.
pub fn redact_url(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

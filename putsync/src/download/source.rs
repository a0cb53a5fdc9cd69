//! Ranged GET against the remote file.
//!
//! [`RangeSource`] is the seam between the fetchers and the network so the
//! transfer logic can be driven by an in-memory source in tests.
//! [`HttpRangeSource`] is the real implementation. It follows redirects
//! itself because the download endpoint usually bounces to a storage host
//! and the `Range` header has to be present on every hop.

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Method, StatusCode, Url};

use super::error::{DownloadError, DownloadResult};
use crate::remote::redact_url;

/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 10;

/// Body of a ranged response.
pub type RangeBody = Box<dyn Read + Send>;

/// Source of byte ranges of a remote file.
pub trait RangeSource: Send + Sync {
    /// Open the bytes `[start, end_inclusive]` of `url`.
    ///
    /// The returned reader yields the body starting at `start`.
    fn fetch(&self, url: &str, start: u64, end_inclusive: u64) -> DownloadResult<RangeBody>;
}

/// Blocking reqwest implementation of [`RangeSource`].
#[derive(Debug, Clone)]
pub struct HttpRangeSource {
    client: Client,
}

impl HttpRangeSource {
    /// Create a source whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> DownloadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DownloadError::Request {
                url: String::new(),
                source: e,
            })?;

        Ok(Self { client })
    }

    /// Size of the remote file from a HEAD request's Content-Length.
    pub fn content_length(&self, url: &str) -> DownloadResult<u64> {
        let response = self.send_following(Method::HEAD, url, None)?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: redact_url(response.url()),
                status: response.status().as_u16(),
            });
        }

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| DownloadError::UnknownSize {
                url: display_url(url),
            })
    }

    /// Send a request, following redirects and re-attaching `range` each hop.
    fn send_following(
        &self,
        method: Method,
        url: &str,
        range: Option<&str>,
    ) -> DownloadResult<Response> {
        let mut current = Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
            url: display_url(url),
            reason: e.to_string(),
        })?;

        for hop in 0..=MAX_REDIRECTS {
            let mut request = self.client.request(method.clone(), current.clone());
            if let Some(range) = range {
                request = request.header(RANGE, range);
            }

            let response = request.send().map_err(|e| DownloadError::Request {
                url: redact_url(&current),
                source: e.without_url(),
            })?;

            if !is_followed_redirect(response.status()) {
                return Ok(response);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| DownloadError::MissingLocation {
                    url: redact_url(&current),
                })?;

            let next = current
                .join(location)
                .map_err(|e| DownloadError::InvalidUrl {
                    url: display_url(location),
                    reason: e.to_string(),
                })?;

            tracing::debug!(
                hop,
                from = %redact_url(&current),
                to = %redact_url(&next),
                "Following redirect"
            );
            current = next;
        }

        Err(DownloadError::TooManyRedirects {
            url: display_url(url),
        })
    }
}

impl RangeSource for HttpRangeSource {
    fn fetch(&self, url: &str, start: u64, end_inclusive: u64) -> DownloadResult<RangeBody> {
        let range = format!("bytes={}-{}", start, end_inclusive);
        let response = self.send_following(Method::GET, url, Some(&range))?;

        // A 200 carries the whole file, which is only usable when we wanted
        // it from the first byte.
        let status = response.status();
        if status == StatusCode::PARTIAL_CONTENT {
            check_content_range(&response, start)?;
            return Ok(Box::new(response));
        }
        if status == StatusCode::OK && start == 0 {
            return Ok(Box::new(response));
        }

        Err(DownloadError::Status {
            url: redact_url(response.url()),
            status: status.as_u16(),
        })
    }
}

/// A URL string fit for logs and errors: without its query when it parses.
pub(crate) fn display_url(url: &str) -> String {
    Url::parse(url)
        .map(|parsed| redact_url(&parsed))
        .unwrap_or_else(|_| url.to_string())
}

/// Reject a 206 whose body does not begin at `start`.
fn check_content_range(response: &Response, start: u64) -> DownloadResult<()> {
    let header = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok());

    match header.and_then(content_range_start) {
        Some(first) if first == start => Ok(()),
        _ => Err(DownloadError::RangeMismatch {
            url: redact_url(response.url()),
            requested: start,
            content_range: header.unwrap_or("missing").to_string(),
        }),
    }
}

/// First byte of a `Content-Range: bytes <first>-<last>/<total>` value.
fn content_range_start(value: &str) -> Option<u64> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (first, _) = spec.split_once('-')?;
    first.trim().parse().ok()
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

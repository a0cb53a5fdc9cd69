//! Local HTTP servers for integration tests.
//!
//! [`TestServer`] is a `wiremock` server with these routes:
//!
//! - `/files/42/download`, `/v2/files/42/download`: 302 to `/storage/file.bin`
//! - `/storage/file.bin`: byte ranges of the payload (206), HEAD gives size
//! - `/storage/shifted.bin`: 206 whose body always starts at byte 0
//! - `/storage/ignore-range.bin`: always 200 with the whole payload
//! - `/loop`: redirects to itself
//! - `/v2/files/list`, `/v2/files/create-folder`: canned put.io JSON
//!
//! The blocking client cannot run inside the runtime, so the server lives
//! on a runtime owned by the test and requests are made outside it.
//!
//! [`FlakyServer`] is a raw socket server whose first GET closes the
//! connection half way through the body, which `wiremock` cannot express.

#![allow(dead_code)]

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Id of the folder `ensure_folder` creates.
pub const CREATED_FOLDER_ID: i64 = 77;

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub range: Option<String>,
    pub body: String,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }
}

impl From<&Request> for Recorded {
    fn from(request: &Request) -> Self {
        let target = match request.url.query() {
            Some(query) => format!("{}?{}", request.url.path(), query),
            None => request.url.path().to_string(),
        };
        Self {
            method: request.method.to_string(),
            target,
            range: request
                .headers
                .get("range")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: String::from_utf8_lossy(&request.body).into_owned(),
        }
    }
}

pub struct TestServer {
    // Dropped before the runtime it was started on.
    server: MockServer,
    runtime: Runtime,
}

impl TestServer {
    pub fn start(payload: Vec<u8>) -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(async {
            let server = MockServer::start().await;
            mount_routes(&server, payload).await;
            server
        });
        Self { server, runtime }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .iter()
            .map(Recorded::from)
            .collect()
    }

    /// Requests for `path`, ignoring the query.
    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }
}

async fn mount_routes(server: &MockServer, payload: Vec<u8>) {
    for from in ["/files/42/download", "/v2/files/42/download"] {
        Mock::given(path(from))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/storage/file.bin"))
            .mount(server)
            .await;
    }

    Mock::given(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(server)
        .await;

    Mock::given(path("/storage/file.bin"))
        .respond_with(ServeRanges {
            payload: payload.clone(),
            shifted: false,
        })
        .mount(server)
        .await;

    Mock::given(path("/storage/shifted.bin"))
        .respond_with(ServeRanges {
            payload: payload.clone(),
            shifted: true,
        })
        .mount(server)
        .await;

    Mock::given(path("/storage/ignore-range.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/files/list"))
        .and(query_param("parent_id", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "files": [
                {"id": 5, "name": "Other", "content_type": "application/x-directory", "size": 0}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/files/list"))
        .and(query_param("parent_id", CREATED_FOLDER_ID.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "files": [
                {"id": 42, "name": "movie.bin", "content_type": "video/x-matroska", "size": payload.len()}
            ]
        })))
        .mount(server)
        .await;

    // Any other folder is empty.
    Mock::given(method("GET"))
        .and(path("/v2/files/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "files": []
        })))
        .with_priority(10)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/files/create-folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "file": {
                "id": CREATED_FOLDER_ID,
                "name": "Putio Desktop",
                "content_type": "application/x-directory",
                "size": 0
            }
        })))
        .mount(server)
        .await;
}

/// Answers `Range: bytes=a-b` with the matching slice of the payload.
///
/// With `shifted`, the body and its Content-Range start at byte 0 no
/// matter which offset was asked for.
struct ServeRanges {
    payload: Vec<u8>,
    shifted: bool,
}

impl Respond for ServeRanges {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if request.method.as_str() == "HEAD" {
            return ResponseTemplate::new(200)
                .insert_header("Content-Length", self.payload.len().to_string().as_str())
                .set_body_bytes(self.payload.clone());
        }

        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_range);
        let Some((start, end)) = range else {
            return ResponseTemplate::new(416);
        };
        let Some((start, end)) = clamp_range(start, end, self.payload.len()) else {
            return ResponseTemplate::new(416);
        };
        let (start, end) = if self.shifted {
            (0, end - start)
        } else {
            (start, end)
        };

        ResponseTemplate::new(206)
            .insert_header(
                "Content-Range",
                format!("bytes {}-{}/{}", start, end, self.payload.len()).as_str(),
            )
            .set_body_bytes(self.payload[start..=end].to_vec())
    }
}

/// Serves byte ranges of a payload over raw sockets, cutting the first
/// GET off after half of its body.
pub struct FlakyServer {
    base: String,
    state: Arc<FlakyState>,
}

struct FlakyState {
    payload: Vec<u8>,
    requests: Mutex<Vec<Recorded>>,
    armed: AtomicBool,
}

impl FlakyServer {
    pub fn start(payload: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(FlakyState {
            payload,
            requests: Mutex::new(Vec::new()),
            armed: AtomicBool::new(true),
        });

        let server_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let state = Arc::clone(&server_state);
                thread::spawn(move || {
                    let _ = serve_flaky(stream, &state);
                });
            }
        });

        Self { base, state }
    }

    pub fn url(&self) -> String {
        format!("{}/storage/flaky.bin", self.base)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().clone()
    }
}

fn serve_flaky(stream: TcpStream, state: &FlakyState) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut range = None;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range = Some(value.trim().to_string());
            }
        }
    }

    state.requests.lock().push(Recorded {
        method,
        target,
        range: range.clone(),
        body: String::new(),
    });

    let mut stream = stream;
    let bounds = range
        .as_deref()
        .and_then(parse_range)
        .and_then(|(start, end)| clamp_range(start, end, state.payload.len()));
    let Some((start, end)) = bounds else {
        return stream.write_all(
            b"HTTP/1.1 416 Range Not Satisfiable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
    };

    let body = &state.payload[start..=end];
    let head = format!(
        "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        start,
        end,
        state.payload.len(),
        body.len()
    );
    stream.write_all(head.as_bytes())?;

    if state.armed.swap(false, Ordering::SeqCst) {
        stream.write_all(&body[..body.len() / 2])?;
        stream.flush()
    } else {
        stream.write_all(body)
    }
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

fn clamp_range(start: usize, end: usize, len: usize) -> Option<(usize, usize)> {
    let end = end.min(len.checked_sub(1)?);
    (start <= end).then_some((start, end))
}

/// Deterministic test payload.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

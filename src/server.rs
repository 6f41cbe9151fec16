//! HTTP boundary
//!
//! [`handle`] maps one request onto the capture pipeline and is independent
//! of the HTTP library; [`serve`] feeds it from a `tiny_http` server with a
//! fixed number of worker threads, which bounds how many browsers run at once.

use crate::fetch::{self, ProxiedResource};
use crate::pipeline::{CaptureOutcome, CaptureRequest};
use crate::{CaptureConfig, CaptureMode, Error, Result};
use log::{error, info, warn};
use serde::Deserialize;
use std::io::Read;
use std::sync::Arc;
use std::thread;

/// What the handler needs from the rest of the system.
pub trait Backend: Send + Sync {
    fn capture(&self, request: &CaptureRequest, mode: CaptureMode) -> Result<CaptureOutcome>;
    fn proxy(&self, url: &str) -> Result<ProxiedResource>;
}

/// Production backend: headless Chrome captures and real HTTP fetches.
#[cfg(feature = "cdp")]
pub struct ChromeBackend {
    automatic: CaptureConfig,
    manual: CaptureConfig,
}

#[cfg(feature = "cdp")]
impl ChromeBackend {
    pub fn new(automatic: CaptureConfig, manual: CaptureConfig) -> Result<Self> {
        automatic.validate()?;
        manual.validate()?;
        Ok(Self { automatic, manual })
    }
}

#[cfg(feature = "cdp")]
impl Default for ChromeBackend {
    fn default() -> Self {
        Self {
            automatic: CaptureConfig::for_mode(CaptureMode::Automatic),
            manual: CaptureConfig::for_mode(CaptureMode::Manual),
        }
    }
}

#[cfg(feature = "cdp")]
impl Backend for ChromeBackend {
    fn capture(&self, request: &CaptureRequest, mode: CaptureMode) -> Result<CaptureOutcome> {
        let config = match mode {
            CaptureMode::Automatic => &self.automatic,
            CaptureMode::Manual => &self.manual,
        };
        crate::pipeline::capture(request, config)
    }

    fn proxy(&self, url: &str) -> Result<ProxiedResource> {
        fetch::proxy_fetch(url, &self.automatic)
    }
}

/// Library-independent view of an incoming request
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: &'a str,
    /// Path without the query string
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub body: &'a [u8],
}

impl<'a> HttpRequest<'a> {
    /// Split a request target such as `/api/proxy?url=...` into path and query.
    pub fn new(method: &'a str, target: &'a str, body: &'a [u8]) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        Self {
            method,
            path,
            query,
            body,
        }
    }

    fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Response produced by [`handle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: value.to_string().into_bytes(),
        }
    }

    fn error(status: u16, message: impl Into<String>, details: Option<String>) -> Self {
        let mut body = serde_json::json!({ "error": message.into() });
        if let Some(details) = details {
            body["details"] = serde_json::Value::String(details);
        }
        Self::json(status, body)
    }

    fn pdf(bytes: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![
                ("Content-Type".to_string(), fetch::PDF_MEDIA_TYPE.to_string()),
                (
                    "Content-Disposition".to_string(),
                    "attachment; filename=download.pdf".to_string(),
                ),
            ],
            body: bytes,
        }
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Deserialize)]
struct DownloadBody {
    url: Option<String>,
}

/// Route a request.
///
/// - `POST /api/download`: automatic capture
/// - `POST /api/manual-download`: high-fidelity capture
/// - `GET /api/proxy?url=`: relay a resource with its content type
pub fn handle<B: Backend + ?Sized>(backend: &B, request: &HttpRequest<'_>) -> HttpResponse {
    match request.path {
        "/api/download" => handle_download(backend, request, CaptureMode::Automatic),
        "/api/manual-download" => handle_download(backend, request, CaptureMode::Manual),
        "/api/proxy" => handle_proxy(backend, request),
        _ => HttpResponse::error(404, "Not found", None),
    }
}

fn handle_download<B: Backend + ?Sized>(backend: &B, request: &HttpRequest<'_>, mode: CaptureMode) -> HttpResponse {
    if !request.method.eq_ignore_ascii_case("POST") {
        return HttpResponse::error(405, "Method not allowed", None);
    }

    let body: DownloadBody = match serde_json::from_slice(request.body) {
        Ok(body) => body,
        Err(e) => return HttpResponse::error(400, "Invalid JSON body", Some(e.to_string())),
    };
    let url = match body.url {
        Some(url) if !url.trim().is_empty() => url,
        _ => return HttpResponse::error(400, "URL is required", None),
    };
    let capture_request = match CaptureRequest::new(url) {
        Ok(r) => r,
        Err(e) => return HttpResponse::error(400, e.to_string(), None),
    };

    match backend.capture(&capture_request, mode) {
        Ok(outcome) => HttpResponse::pdf(outcome.bytes),
        Err(e) => {
            error!("Capture of {} failed ({}): {}", capture_request.url(), e.kind(), e);
            failure_response(&e)
        }
    }
}

fn failure_response(e: &Error) -> HttpResponse {
    let status = if e.is_client_error() { 400 } else { 500 };
    let message = match e.hint() {
        Some(hint) => format!("Failed to generate PDF: {}. {}", e, hint),
        None => format!("Failed to generate PDF: {}", e),
    };
    HttpResponse::error(status, message, Some(format!("{:?}", e)))
}

fn handle_proxy<B: Backend + ?Sized>(backend: &B, request: &HttpRequest<'_>) -> HttpResponse {
    if !request.method.eq_ignore_ascii_case("GET") {
        return HttpResponse::error(405, "Method not allowed", None);
    }
    let url = match request.query_param("url") {
        Some(url) if !url.trim().is_empty() => url,
        _ => return HttpResponse::error(400, "URL is required", None),
    };

    match backend.proxy(&url) {
        Ok(resource) => HttpResponse {
            status: 200,
            headers: vec![
                ("Content-Type".to_string(), resource.content_type),
                ("Content-Length".to_string(), resource.bytes.len().to_string()),
                ("Cache-Control".to_string(), "public, max-age=3600".to_string()),
                ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            ],
            body: resource.bytes,
        },
        Err(e) => {
            warn!("Proxy fetch of {} failed: {}", url, e);
            HttpResponse::error(500, e.to_string(), None)
        }
    }
}

/// Default number of concurrent captures: one browser per CPU.
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Serve the API on `addr` with `workers` request threads.
///
/// Each worker handles one request at a time, so at most `workers` browser
/// processes exist at once. Blocks forever unless binding fails.
pub fn serve<B: Backend + 'static>(addr: &str, backend: Arc<B>, workers: usize) -> Result<()> {
    let server = tiny_http::Server::http(addr)
        .map_err(|e| Error::InitializationError(format!("Failed to bind {}: {}", addr, e)))?;
    let server = Arc::new(server);
    let workers = workers.max(1);
    info!("Listening on http://{} with {} capture workers", addr, workers);

    let handles = (0..workers)
        .map(|n| {
            let server = server.clone();
            let backend = backend.clone();
            thread::Builder::new()
                .name(format!("rfcapture-http-{}", n))
                .spawn(move || {
                    for request in server.incoming_requests() {
                        respond(backend.as_ref(), request);
                    }
                })
                .map_err(|e| Error::InitializationError(format!("Failed to spawn HTTP worker: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;

    for handle in handles {
        if handle.join().is_err() {
            error!("HTTP worker panicked");
        }
    }
    Ok(())
}

fn respond<B: Backend + ?Sized>(backend: &B, mut request: tiny_http::Request) {
    let mut body = Vec::new();
    if let Err(e) = request.as_reader().read_to_end(&mut body) {
        warn!("Failed to read request body: {}", e);
        let _ = request.respond(tiny_http::Response::from_string("").with_status_code(400));
        return;
    }

    let method = request.method().to_string();
    let target = request.url().to_string();
    let http_request = HttpRequest::new(&method, &target, &body);
    let response = handle(backend, &http_request);
    info!("{} {} -> {}", method, http_request.path, response.status);

    let mut reply = tiny_http::Response::from_data(response.body).with_status_code(response.status);
    for (name, value) in &response.headers {
        match tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => reply = reply.with_header(header),
            Err(_) => warn!("Dropping invalid response header {}", name),
        }
    }
    if let Err(e) = request.respond(reply) {
        warn!("Failed to send response: {}", e);
    }
}

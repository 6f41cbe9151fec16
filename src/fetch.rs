//! Direct download helpers.
//!
//! The fallback fetcher tries a plain GET before any browser is launched and
//! only accepts a response that really is a PDF. Its failures never surface as
//! request errors. The proxy fetch is the same request without the PDF check,
//! used by the HTTP boundary to relay arbitrary resources.

use crate::{CaptureConfig, Error, Result};
use log::{debug, info, warn};
use reqwest::blocking::{Client, Response};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use std::time::Duration;
use url::Url;

/// Media type accepted by the direct fetch.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A fetched resource together with its upstream content type
#[derive(Debug, Clone)]
pub struct ProxiedResource {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Whether the URL is served by a protected viewer host (or one of its subdomains).
pub fn is_protected_url(url: &str, protected_hosts: &[String]) -> bool {
    let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase)) {
        Some(host) => host,
        None => return false,
    };
    protected_hosts.iter().any(|protected| {
        let protected = protected.to_ascii_lowercase();
        host == protected || host.ends_with(&format!(".{}", protected))
    })
}

/// Whether a `Content-Type` value declares a PDF. Parameters are ignored,
/// the media type itself must match exactly.
pub fn is_pdf_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_MEDIA_TYPE))
        .unwrap_or(false)
}

fn build_client(config: &CaptureConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/pdf,text/html,application/xhtml+xml,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(header::REFERER, HeaderValue::from_static("https://www.google.com/"));

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_millis(config.fetch_timeout_ms))
        .redirect(Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| Error::NetworkError(format!("Failed to build HTTP client: {}", e)))
}

fn get(client: &Client, url: &str) -> Result<Response> {
    client
        .get(url)
        .send()
        .map_err(|e| Error::NetworkError(format!("HTTP GET failed: {}", e)))
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Try to download the document directly.
///
/// Returns `None` for protected-viewer URLs and for any response that is not
/// a successful PDF: wrong content type, HTTP error, network failure, timeout.
pub fn try_direct_fetch(url: &str, config: &CaptureConfig) -> Option<Vec<u8>> {
    if is_protected_url(url, &config.protected_hosts) {
        debug!("Skipping direct fetch for protected viewer URL {}", url);
        return None;
    }

    let attempt = || -> Result<Option<Vec<u8>>> {
        let client = build_client(config)?;
        let response = get(&client, url)?;
        let status = response.status();
        let declared = content_type(&response);

        if !status.is_success() {
            debug!("Direct fetch of {} answered {}", url, status);
            return Ok(None);
        }
        if !declared.as_deref().map(is_pdf_content_type).unwrap_or(false) {
            debug!("Direct fetch of {} returned {:?}, not a PDF", url, declared);
            return Ok(None);
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::NetworkError(format!("Failed to read response body: {}", e)))?;
        Ok(Some(bytes.to_vec()))
    };

    match attempt() {
        Ok(Some(bytes)) => {
            info!("Direct fetch of {} returned a PDF ({} bytes)", url, bytes.len());
            Some(bytes)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Direct fetch of {} failed, falling back to rendering: {}", url, e);
            None
        }
    }
}

/// Fetch any resource and keep its content type (defaults to PDF when the
/// upstream does not declare one).
pub fn proxy_fetch(url: &str, config: &CaptureConfig) -> Result<ProxiedResource> {
    let client = build_client(config)?;
    let response = get(&client, url)?;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(Error::NetworkError(format!("Upstream responded with {}", status)));
    }

    let content_type = content_type(&response).unwrap_or_else(|| PDF_MEDIA_TYPE.to_string());
    let bytes = response
        .bytes()
        .map_err(|e| Error::NetworkError(format!("Failed to read response body: {}", e)))?;

    Ok(ProxiedResource {
        content_type,
        bytes: bytes.to_vec(),
    })
}

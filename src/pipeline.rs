//! End-to-end capture of one request: direct fetch first, then the
//! render -> load -> extract -> assemble pipeline inside one browser session.

use crate::extract;
use crate::pdf::{AssembledDocument, PdfEncoder};
use crate::session::{Session, SessionGuard};
use crate::viewer;
use crate::{CaptureConfig, Error, Result};
use log::{info, warn};
use url::Url;

/// A single capture request. The URL is validated on construction, before
/// any browser is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    source_url: String,
}

impl CaptureRequest {
    pub fn new(source_url: impl Into<String>) -> Result<Self> {
        let source_url = source_url.into().trim().to_string();
        if source_url.is_empty() {
            return Err(Error::InvalidInput("URL is required".into()));
        }

        let parsed = Url::parse(&source_url)
            .map_err(|e| Error::InvalidInput(format!("Malformed URL {}: {}", source_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!("Not an http(s) URL: {}", source_url)));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(Error::InvalidInput(format!("URL has no host: {}", source_url)));
        }

        Ok(Self { source_url })
    }

    pub fn url(&self) -> &str {
        &self.source_url
    }
}

/// Where the returned bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// The URL served the PDF directly
    Direct,
    /// The pages were rendered and reassembled
    Rendered { pages: usize },
}

/// Result of a capture: the PDF bytes and how they were obtained.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub bytes: Vec<u8>,
    pub source: CaptureSource,
}

/// Capture a document with the headless Chrome backend.
#[cfg(feature = "cdp")]
pub fn capture(request: &CaptureRequest, config: &CaptureConfig) -> Result<CaptureOutcome> {
    capture_with(request, config, crate::cdp::CdpSession::open)
}

/// Capture a document, opening the renderer session with `open`.
///
/// The direct fetch (when the `fetch` feature is enabled) short-circuits the
/// pipeline; `open` is then never called.
pub fn capture_with<S, F>(request: &CaptureRequest, config: &CaptureConfig, open: F) -> Result<CaptureOutcome>
where
    S: Session,
    F: FnOnce(&str, &CaptureConfig) -> Result<S>,
{
    config.validate()?;
    info!("Capturing {}", request.url());

    #[cfg(feature = "fetch")]
    if let Some(bytes) = crate::fetch::try_direct_fetch(request.url(), config) {
        return Ok(CaptureOutcome {
            bytes,
            source: CaptureSource::Direct,
        });
    }

    let document = render_document(request, config, open)?;
    info!(
        "Captured {} pages ({} bytes) from {}",
        document.page_count(),
        document.bytes.len(),
        request.url()
    );
    Ok(CaptureOutcome {
        source: CaptureSource::Rendered {
            pages: document.page_count(),
        },
        bytes: document.bytes,
    })
}

/// Run the browser part of the pipeline. The session is closed on every
/// path: explicitly once the pages are extracted, by the guard otherwise.
pub fn render_document<S, F>(request: &CaptureRequest, config: &CaptureConfig, open: F) -> Result<AssembledDocument>
where
    S: Session,
    F: FnOnce(&str, &CaptureConfig) -> Result<S>,
{
    let encoder = PdfEncoder::load(config.page_size);
    let mut session = SessionGuard::new(open(request.url(), config)?);

    viewer::await_viewer_ready(&mut *session, config)?;
    viewer::load_all_pages(&mut *session, config)?;

    let source = extract::source_for(config.source);
    let pages = extract::extract_pages(&mut *session, source.as_ref(), config)?;

    // Bitmaps are in hand; release the browser before encoding.
    if let Err(e) = session.close() {
        warn!("Failed to close renderer session: {}", e);
    }

    encoder.assemble(&pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const VIEWER_URL: &str = "https://drive.google.com/file/d/abc/view";

    #[test]
    fn request_validation() {
        assert!(CaptureRequest::new("https://example.com/a.pdf").is_ok());
        assert_eq!(
            CaptureRequest::new("  http://example.com ").unwrap().url(),
            "http://example.com"
        );
        assert!(CaptureRequest::new("HTTPS://Example.com/view?id=1").is_ok());
        for bad in [
            "",
            "   ",
            "ftp://example.com",
            "https://",
            "https://a b",
            "http://[oops",
            "http://exa mple.com/",
            "example.com/doc.pdf",
            "javascript:alert(1)",
            "file:///etc/passwd",
            "http://:80/",
        ] {
            assert!(
                matches!(CaptureRequest::new(bad), Err(Error::InvalidInput(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn three_portrait_pages_are_assembled() {
        let closes = Arc::new(AtomicU32::new(0));
        let counter = closes.clone();
        let request = CaptureRequest::new(VIEWER_URL).unwrap();
        let outcome = capture_with(&request, &CaptureConfig::default(), move |_, _| {
            Ok(FakePage::new()
                .with_scroll_steps(3)
                .with_close_counter(counter)
                .with_images(vec![
                    FakePage::image(100, 140),
                    FakePage::image(100, 140),
                    FakePage::image(100, 140),
                ]))
        })
        .unwrap();

        assert_eq!(outcome.source, CaptureSource::Rendered { pages: 3 });
        assert!(outcome.bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_viewer_fails_and_closes_session() {
        let closes = Arc::new(AtomicU32::new(0));
        let counter = closes.clone();
        let request = CaptureRequest::new(VIEWER_URL).unwrap();
        let err = capture_with(&request, &CaptureConfig::default(), move |_, _| {
            Ok(FakePage::new().without_viewer().with_close_counter(counter))
        })
        .unwrap_err();

        assert!(matches!(err, Error::ViewerNotFound(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_pages_fails_and_closes_session() {
        let closes = Arc::new(AtomicU32::new(0));
        let counter = closes.clone();
        let request = CaptureRequest::new(VIEWER_URL).unwrap();
        let err = capture_with(&request, &CaptureConfig::default(), move |_, _| {
            Ok(FakePage::new().with_close_counter(counter))
        })
        .unwrap_err();

        assert!(matches!(err, Error::NoPagesDetected(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_config_never_opens_a_session() {
        let request = CaptureRequest::new(VIEWER_URL).unwrap();
        let config = CaptureConfig {
            scale: 0,
            ..Default::default()
        };
        let err = capture_with(&request, &config, |_, _| -> Result<FakePage> {
            panic!("session must not be opened")
        })
        .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn open_failure_is_propagated() {
        let request = CaptureRequest::new(VIEWER_URL).unwrap();
        let err = capture_with(&request, &CaptureConfig::default(), |_, _| -> Result<FakePage> {
            Err(Error::Timeout(30000))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(30000)));
    }
}

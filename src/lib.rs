//! RFox Capture
//!
//! Retrieves "view-only" PDF documents (documents that a web viewer renders
//! page by page as images while blocking the file download) by driving a
//! headless browser, collecting every rendered page bitmap in reading order
//! and reassembling the bitmaps into a PDF.
//!
//! # Pipeline
//!
//! - **Fallback fetch**: a plain GET that short-circuits when the URL already
//!   serves `application/pdf`
//! - **Renderer session**: one headless Chrome instance per request, torn down
//!   on every exit path
//! - **Viewer loader**: waits for the viewer and forces lazy pages to render
//! - **Page extractor**: rasterizes each page image at its natural resolution
//! - **PDF assembler**: fits every page onto an A4 sheet of matching orientation
//!
//! # Example
//!
//! ```no_run
//! use rfcapture::{CaptureConfig, CaptureMode, CaptureRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig::for_mode(CaptureMode::Manual);
//! let request = CaptureRequest::new("https://drive.google.com/file/d/abc/view")?;
//! let outcome = rfcapture::capture(&request, &config)?;
//! std::fs::write("download.pdf", &outcome.bytes)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod extract;
pub mod pdf;
pub mod pipeline;
pub mod session;
pub mod viewer;

#[cfg(test)]
mod testing;

#[cfg(feature = "cdp")]
pub mod cdp;

// Direct download and proxy helpers (no browser involved)
#[cfg(feature = "fetch")]
pub mod fetch;

// HTTP boundary (request handling + tiny_http server loop)
#[cfg(feature = "server")]
pub mod server;

// Async facade running each capture on its own worker thread
pub mod async_api;

pub use async_api::Capturer;
pub use extract::{PageImageSource, RenderedPage, SourceKind};
pub use pdf::{AssembledDocument, Orientation, PageLayout, PageSize, PdfEncoder};
#[cfg(feature = "cdp")]
pub use pipeline::capture;
pub use pipeline::{capture_with, CaptureOutcome, CaptureRequest, CaptureSource};
pub use session::{Session, SessionGuard};
pub use viewer::LoadStrategy;

/// Identity header sent by both the browser and the direct fetcher.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Root container of the Google Drive PDF viewer.
pub const DRIVE_VIEWER_SELECTOR: &str = ".ndfHFb-c4YZDc-Wrql6b";

/// Per-page container inside the Google Drive PDF viewer.
pub const DRIVE_PAGE_SELECTOR: &str = ".ndfHFb-c4YZDc-cYSp0e-DARUcf";

/// Largest accepted upsampling factor.
pub const MAX_SCALE: u32 = 4;

/// How a capture was triggered.
///
/// `Automatic` is the server-driven flow tuned for speed; `Manual` is the
/// high-fidelity flow that scans for viewer-rendered blob images, upsamples
/// them and encodes at maximum quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Automatic,
    Manual,
}

/// Configuration for a capture
///
/// The defaults match the automatic mode. Use [`CaptureConfig::for_mode`] to
/// get the manual preset and struct update syntax to tweak single fields.
///
/// # Examples
///
/// ```
/// let cfg = rfcapture::CaptureConfig::default();
/// assert_eq!(cfg.jpeg_quality, 95);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// User agent string for the browser and the direct fetch
    pub user_agent: String,
    /// Browser window dimensions
    pub viewport: Viewport,
    /// Upper bound for navigation + network quiescence, in milliseconds
    pub navigation_timeout_ms: u64,
    /// How long the network must stay quiet before navigation counts as done
    pub network_idle_ms: u64,
    /// How long to wait for the viewer container, in milliseconds
    pub viewer_timeout_ms: u64,
    /// CSS selector of the viewer root container
    pub viewer_selector: String,
    /// CSS selector of the per-page containers (structural source)
    pub page_selector: String,
    /// CSS selector of the viewer's "next page" control
    pub next_page_selector: String,
    /// CSS selector of the viewer's "previous page" control
    pub prev_page_selector: String,
    /// Explicit scrollable element; the viewer's scrollable ancestor is used when unset
    pub scroll_container_selector: Option<String>,
    /// How to force lazy pages to render
    pub load_strategy: LoadStrategy,
    /// Maximum scroll/navigation steps before giving up on traversal
    pub max_load_steps: u32,
    /// Delay between traversal steps, in milliseconds
    pub load_step_delay_ms: u64,
    /// Delay after traversal before extraction, in milliseconds
    pub settle_delay_ms: u64,
    /// Which page-image detection strategy to use
    pub source: SourceKind,
    /// Integer upsampling factor applied to each page bitmap
    pub scale: u32,
    /// JPEG quality (1..=100) of the embedded page images
    pub jpeg_quality: u8,
    /// Physical size of the output pages
    pub page_size: PageSize,
    /// Timeout of the direct fetch, in milliseconds
    pub fetch_timeout_ms: u64,
    /// Maximum redirects followed by the direct fetch
    pub max_redirects: usize,
    /// Hosts served by the protected viewer; the direct fetch is skipped for these
    pub protected_hosts: Vec<String>,
    /// Relax same-origin and site isolation so page bitmaps can be read back
    pub disable_web_security: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: Viewport::default(),
            navigation_timeout_ms: 30000,
            network_idle_ms: 500,
            viewer_timeout_ms: 10000,
            viewer_selector: DRIVE_VIEWER_SELECTOR.to_string(),
            page_selector: DRIVE_PAGE_SELECTOR.to_string(),
            next_page_selector: "[aria-label='Next page']".to_string(),
            prev_page_selector: "[aria-label='Previous page']".to_string(),
            scroll_container_selector: None,
            load_strategy: LoadStrategy::Auto,
            max_load_steps: 200,
            load_step_delay_ms: 250,
            settle_delay_ms: 1000,
            source: SourceKind::Structural,
            scale: 1,
            jpeg_quality: 95,
            page_size: PageSize::A4,
            fetch_timeout_ms: 30000,
            max_redirects: 5,
            protected_hosts: vec!["drive.google.com".to_string(), "docs.google.com".to_string()],
            disable_web_security: true,
        }
    }
}

impl CaptureConfig {
    /// Preset configuration for a capture mode.
    pub fn for_mode(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Automatic => Self::default(),
            CaptureMode::Manual => Self {
                viewport: Viewport {
                    width: 1920,
                    height: 1080,
                },
                navigation_timeout_ms: 60000,
                source: SourceKind::BlobScan,
                scale: 2,
                jpeg_quality: 100,
                ..Self::default()
            },
        }
    }

    /// Check the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::ConfigError(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if !(1..=MAX_SCALE).contains(&self.scale) {
            return Err(Error::ConfigError(format!(
                "scale must be within 1..={}, got {}",
                MAX_SCALE, self.scale
            )));
        }
        if self.navigation_timeout_ms == 0 || self.viewer_timeout_ms == 0 {
            return Err(Error::ConfigError("timeouts must be non-zero".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError("viewport must be non-empty".into()));
        }
        if self.viewer_selector.trim().is_empty() {
            return Err(Error::ConfigError("viewer_selector is empty".into()));
        }
        Ok(())
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.viewport.width, 1200);
        assert_eq!(config.viewport.height, 800);
        assert_eq!(config.source, SourceKind::Structural);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_manual_preset() {
        let config = CaptureConfig::for_mode(CaptureMode::Manual);
        assert_eq!(config.source, SourceKind::BlobScan);
        assert_eq!(config.scale, 2);
        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.navigation_timeout_ms, 60000);
        assert_eq!(config.viewport, Viewport { width: 1920, height: 1080 });
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = CaptureConfig {
            jpeg_quality: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::ConfigError(_))));

        let cfg = CaptureConfig {
            scale: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::ConfigError(_))));

        let cfg = CaptureConfig {
            scale: 70_000,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::ConfigError(_))));

        let cfg = CaptureConfig {
            scale: MAX_SCALE,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());

        let cfg = CaptureConfig {
            viewer_timeout_ms: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}

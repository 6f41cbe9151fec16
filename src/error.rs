//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing a document
#[derive(Error, Debug)]
pub enum Error {
    /// The request was rejected before any browser was launched
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failed to launch the browser or open a tab
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    /// The source page failed to load
    #[error("Navigation failed: {0}")]
    NavigationError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The document viewer root never appeared
    #[error("PDF viewer container not found (selector `{0}`)")]
    ViewerNotFound(String),

    /// Loading finished but no rendered page images were found
    #[error("No PDF pages found: {0}")]
    NoPagesDetected(String),

    /// Pages were extracted but none made it into the document
    #[error("No pages were processed: {0}")]
    AssemblyFailure(String),

    /// Failed to execute JavaScript in the page
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Failed to decode or encode a page bitmap
    #[error("Image processing failed: {0}")]
    ImageError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable short name of the error kind, used in logs and JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::InitializationError(_) => "initialization",
            Error::NavigationError(_) => "navigation",
            Error::Timeout(_) => "timeout",
            Error::ViewerNotFound(_) => "viewer_not_found",
            Error::NoPagesDetected(_) => "no_pages_detected",
            Error::AssemblyFailure(_) => "assembly_failure",
            Error::ScriptError(_) => "script",
            Error::ImageError(_) => "image",
            Error::ConfigError(_) => "config",
            Error::NetworkError(_) => "network",
            #[cfg(feature = "cdp")]
            Error::CdpError(_) => "cdp",
            Error::Other(_) => "other",
        }
    }

    /// Whether the error was caused by the caller's input rather than the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }

    /// A user-facing suggestion for errors that have an obvious remedy.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::NoPagesDetected(_) | Error::AssemblyFailure(_) => {
                Some("Please make sure to scroll through all pages.")
            }
            Error::ViewerNotFound(_) => {
                Some("The URL does not look like a protected PDF viewer.")
            }
            _ => None,
        }
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::ImageError(err.to_string())
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::AssemblyFailure(format!("pdf encoding error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_not_found_mentions_container() {
        let err = Error::ViewerNotFound(".viewer".into());
        let msg = err.to_string();
        assert!(msg.contains("viewer container not found"));
        assert_eq!(err.kind(), "viewer_not_found");
    }

    #[test]
    fn only_invalid_input_is_client_error() {
        assert!(Error::InvalidInput("x".into()).is_client_error());
        assert!(!Error::NoPagesDetected("x".into()).is_client_error());
        assert!(!Error::Timeout(10).is_client_error());
    }

    #[test]
    fn no_pages_carries_scroll_hint() {
        let hint = Error::NoPagesDetected("none".into()).hint().unwrap();
        assert!(hint.contains("scroll"));
        assert!(Error::NetworkError("x".into()).hint().is_none());
    }
}

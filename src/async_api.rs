use crate::pipeline::{self, CaptureOutcome, CaptureRequest};
use crate::session::Session;
use crate::{CaptureConfig, Error, Result};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

/// An async-friendly capture facade.
///
/// The pipeline is blocking (it drives a synchronous CDP client and sleeps
/// between loader steps), so every capture runs on its own worker thread and
/// reports back through a oneshot channel. One call = one worker = one
/// browser; concurrent calls never share a browser.
#[derive(Clone)]
pub struct Capturer {
    config: Arc<CaptureConfig>,
}

impl Capturer {
    /// Create a capturer; the configuration is validated up front.
    pub fn new(config: CaptureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture `url` with the headless Chrome backend.
    #[cfg(feature = "cdp")]
    pub async fn capture(&self, url: &str) -> Result<CaptureOutcome> {
        self.capture_using(url, crate::cdp::CdpSession::open).await
    }

    /// Capture `url`, opening the renderer session with `open` on the worker thread.
    pub async fn capture_using<S, F>(&self, url: &str, open: F) -> Result<CaptureOutcome>
    where
        S: Session,
        F: FnOnce(&str, &CaptureConfig) -> Result<S> + Send + 'static,
    {
        // Reject bad input before spawning anything.
        let request = CaptureRequest::new(url)?;
        let config = self.config.clone();

        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name("rfcapture-worker".to_string())
            .spawn(move || {
                let res = pipeline::capture_with(&request, &config, open);
                // Receiver dropped means the caller went away; nothing to report to.
                let _ = tx.send(res);
            })
            .map_err(|e| Error::InitializationError(format!("Failed to spawn capture worker: {}", e)))?;

        rx.await
            .map_err(|e| Error::Other(format!("Capture canceled: {}", e)))?
    }

    /// Fetch a resource for relaying, off the async runtime.
    #[cfg(feature = "fetch")]
    pub async fn proxy(&self, url: &str) -> Result<crate::fetch::ProxiedResource> {
        let url = url.to_string();
        let config = self.config.clone();

        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name("rfcapture-proxy".to_string())
            .spawn(move || {
                let _ = tx.send(crate::fetch::proxy_fetch(&url, &config));
            })
            .map_err(|e| Error::InitializationError(format!("Failed to spawn proxy worker: {}", e)))?;

        rx.await
            .map_err(|e| Error::Other(format!("Proxy canceled: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CaptureSource;
    use crate::testing::FakePage;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn capture_runs_on_worker_and_closes_session() {
        let capturer = Capturer::new(CaptureConfig::default()).unwrap();
        let closes = Arc::new(AtomicU32::new(0));
        let counter = closes.clone();

        let outcome = capturer
            .capture_using("https://drive.google.com/file/d/abc/view", move |_, _| {
                Ok(FakePage::new()
                    .with_close_counter(counter)
                    .with_images(vec![FakePage::image(80, 60)]))
            })
            .await
            .unwrap();

        assert_eq!(outcome.source, CaptureSource::Rendered { pages: 1 });
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_spawning() {
        let capturer = Capturer::new(CaptureConfig::default()).unwrap();
        let err = capturer
            .capture_using("", |_, _| -> Result<FakePage> { panic!("must not open") })
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = CaptureConfig {
            jpeg_quality: 101,
            ..Default::default()
        };
        assert!(Capturer::new(config).is_err());
    }
}

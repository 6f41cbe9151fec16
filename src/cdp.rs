//! Chrome DevTools Protocol session implementation

use crate::session::Session;
use crate::{CaptureConfig, Error, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Polling interval of the network quiescence check
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Flags that let the page read back viewer bitmaps drawn from other origins.
const RELAXED_ISOLATION_ARGS: &[&str] = &[
    "--disable-web-security",
    "--disable-features=IsolateOrigins,site-per-process",
    "--disable-site-isolation-trials",
];

/// CDP-backed renderer session (uses the `headless_chrome` crate)
///
/// Launches a throwaway headless Chrome process, opens a single tab and
/// navigates it. Dropping the browser handle terminates the child process.
pub struct CdpSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    config: CaptureConfig,
    closed: bool,
}

impl CdpSession {
    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab
            .as_ref()
            .ok_or_else(|| Error::CdpError("Session is already closed".into()))
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        let started = Instant::now();
        let tab = self.tab()?.clone();

        tab.navigate_to(url)
            .map_err(|e| Error::NavigationError(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| Error::NavigationError(format!("Wait for navigation failed: {}", e)))?;

        self.wait_for_network_idle(started)?;
        debug!("Navigated to {} in {:?}", url, started.elapsed());
        Ok(())
    }

    /// Wait until the document is complete and no new resource has started
    /// loading for `network_idle_ms`, bounded by the navigation timeout.
    fn wait_for_network_idle(&mut self, started: Instant) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct LoadState {
            ready: String,
            resources: u64,
        }

        let budget = Duration::from_millis(self.config.navigation_timeout_ms);
        let idle = Duration::from_millis(self.config.network_idle_ms);
        let script = r#"(function() {
            return {
                ready: document.readyState,
                resources: performance.getEntriesByType('resource').length
            };
        })()"#;

        let mut last_count = None;
        let mut quiet_since = Instant::now();
        loop {
            let state: LoadState = self.evaluate_as(script, false)?;
            if state.ready == "complete" && last_count == Some(state.resources) {
                if quiet_since.elapsed() >= idle {
                    return Ok(());
                }
            } else {
                last_count = Some(state.resources);
                quiet_since = Instant::now();
            }

            if started.elapsed() >= budget {
                return Err(Error::Timeout(self.config.navigation_timeout_ms));
            }
            std::thread::sleep(IDLE_POLL_INTERVAL);
        }
    }
}

impl Session for CdpSession {
    fn open(url: &str, config: &CaptureConfig) -> Result<Self> {
        let mut args: Vec<&OsStr> = vec![OsStr::new("--hide-scrollbars")];
        if config.disable_web_security {
            args.extend(RELAXED_ISOLATION_ARGS.iter().map(OsStr::new));
        }

        // The CDP connection must outlive the slowest step of a capture.
        let traversal_ms = u64::from(config.max_load_steps) * config.load_step_delay_ms;
        let idle_timeout = Duration::from_millis(
            config.navigation_timeout_ms
                + config.viewer_timeout_ms
                + traversal_ms
                + config.settle_delay_ms
                + 60_000,
        );

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(idle_timeout)
            .args(args)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        tab.set_default_timeout(Duration::from_millis(config.navigation_timeout_ms));
        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| Error::InitializationError(format!("Failed to set user agent: {}", e)))?;

        info!("Launched headless browser for {}", url);

        let mut session = Self {
            browser: Some(browser),
            tab: Some(tab),
            config: config.clone(),
            closed: false,
        };

        if let Err(e) = session.navigate(url) {
            if let Err(close_err) = session.close() {
                warn!("Failed to close browser after navigation error: {}", close_err);
            }
            return Err(e);
        }

        Ok(session)
    }

    fn evaluate(&mut self, script: &str, await_promise: bool) -> Result<serde_json::Value> {
        // Serialize inside the page so objects and arrays come back by value.
        let body = script.trim().trim_end_matches(';');
        let wrapper = if await_promise {
            format!(
                "(async function() {{ const __rfox_v = await ({}); return JSON.stringify(__rfox_v === undefined ? null : __rfox_v); }})()",
                body
            )
        } else {
            format!(
                "(function() {{ const __rfox_v = ({}); return JSON.stringify(__rfox_v === undefined ? null : __rfox_v); }})()",
                body
            )
        };

        let result = self
            .tab()?
            .evaluate(&wrapper, await_promise)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;

        match result.value {
            Some(serde_json::Value::String(s)) => serde_json::from_str(&s)
                .map_err(|e| Error::ScriptError(format!("Malformed script result: {}", e))),
            Some(other) => Ok(other),
            None => Err(Error::ScriptError("No value returned from evaluation".into())),
        }
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        match self.tab()?.wait_for_element_with_custom_timeout(selector, timeout) {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!("Selector `{}` not found within {:?}: {}", selector, timeout, e);
                Ok(false)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = Ok(());
        if let Some(tab) = self.tab.take() {
            if let Err(e) = tab.close(false) {
                result = Err(Error::CdpError(format!("Failed to close tab: {}", e)));
            }
        }
        // Dropping the browser kills the Chrome child process.
        drop(self.browser.take());
        debug!("Renderer session closed");
        result
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

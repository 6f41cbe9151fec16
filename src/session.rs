//! Renderer session abstraction
//!
//! A session owns one browser instance with one navigated page. The loader
//! and extractor only talk to the page through this trait, which keeps them
//! independent of the CDP backend and lets tests drive them with a scripted
//! page.

use crate::{CaptureConfig, Error, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Core trait for renderer session implementations
pub trait Session {
    /// Launch an isolated browser, navigate to `url` and wait until the
    /// network has been quiet for the configured window.
    fn open(url: &str, config: &CaptureConfig) -> Result<Self>
    where
        Self: Sized;

    /// Evaluate JavaScript in the page's global context and return its JSON value.
    /// When `await_promise` is set, a returned promise is awaited first.
    fn evaluate(&mut self, script: &str, await_promise: bool) -> Result<serde_json::Value>;

    /// Wait up to `timeout` for an element matching `selector`.
    ///
    /// Absence is reported as `Ok(false)`, not as an error.
    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Suspend between steps so the page can render asynchronously.
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Close the page and then the browser. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Whether `close` has already run.
    fn is_closed(&self) -> bool;

    /// Evaluate a script and deserialize its value.
    fn evaluate_as<T: DeserializeOwned>(&mut self, script: &str, await_promise: bool) -> Result<T>
    where
        Self: Sized,
    {
        let value = self.evaluate(script, await_promise)?;
        serde_json::from_value(value)
            .map_err(|e| Error::ScriptError(format!("Unexpected script result: {}", e)))
    }
}

/// Scoped ownership of a session: dropping the guard closes the session.
///
/// Every pipeline step runs through a guard, so the browser process is
/// released on success, on error and on timeout alike.
pub struct SessionGuard<S: Session> {
    inner: S,
}

impl<S: Session> SessionGuard<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Close the session now and report any teardown error.
    pub fn close(mut self) -> Result<()> {
        self.inner.close()
    }
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.inner
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.inner.is_closed() {
            return;
        }
        debug!("Tearing down renderer session");
        if let Err(e) = self.inner.close() {
            warn!("Failed to close renderer session: {}", e);
        }
    }
}

/// Quote a string as a JavaScript string literal.
pub(crate) fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

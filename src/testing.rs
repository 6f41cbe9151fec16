//! Scripted in-memory page used by the unit tests.

use crate::session::Session;
use crate::{CaptureConfig, Error, Result};
use base64::Engine as Base64Engine;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Encode a solid-color RGBA bitmap as PNG.
pub(crate) fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    out
}

/// Pretends to be a viewer page: answers the loader's and extractor's
/// scripts from plain counters instead of a DOM.
pub(crate) struct FakePage {
    pub viewer_present: bool,
    pub scroll_steps: u32,
    pub next_clicks: u32,
    pub current_page: u32,
    pub images: Vec<serde_json::Value>,
    pub evaluated: Vec<String>,
    pub slept: Vec<Duration>,
    pub closes: Arc<AtomicU32>,
    closed: bool,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            viewer_present: true,
            scroll_steps: 0,
            next_clicks: 0,
            current_page: 0,
            images: Vec::new(),
            evaluated: Vec::new(),
            slept: Vec::new(),
            closes: Arc::new(AtomicU32::new(0)),
            closed: false,
        }
    }

    pub fn without_viewer(mut self) -> Self {
        self.viewer_present = false;
        self
    }

    pub fn with_scroll_steps(mut self, steps: u32) -> Self {
        self.scroll_steps = steps;
        self
    }

    pub fn with_next_clicks(mut self, clicks: u32) -> Self {
        self.next_clicks = clicks;
        self
    }

    pub fn with_images(mut self, images: Vec<serde_json::Value>) -> Self {
        self.images = images;
        self
    }

    pub fn with_close_counter(mut self, closes: Arc<AtomicU32>) -> Self {
        self.closes = closes;
        self
    }

    pub fn image(width: u32, height: u32) -> serde_json::Value {
        let png = png_bytes(width, height, [30, 60, 90, 255]);
        let data = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        );
        serde_json::json!({ "width": width, "height": height, "data": data, "error": null })
    }

    pub fn transparent_image(width: u32, height: u32) -> serde_json::Value {
        let png = png_bytes(width, height, [0, 0, 0, 0]);
        let data = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        );
        serde_json::json!({ "width": width, "height": height, "data": data, "error": null })
    }

    pub fn failed_image(error: &str) -> serde_json::Value {
        serde_json::json!({ "width": 0, "height": 0, "data": null, "error": error })
    }
}

impl Session for FakePage {
    fn open(_url: &str, _config: &CaptureConfig) -> Result<Self> {
        Ok(Self::new())
    }

    fn evaluate(&mut self, script: &str, _await_promise: bool) -> Result<serde_json::Value> {
        if self.closed {
            return Err(Error::Other("session closed".into()));
        }
        self.evaluated.push(script.to_string());

        if script.contains("rfcapture:probe") {
            return Ok(serde_json::json!(self.next_clicks > 0));
        }
        if script.contains("rfcapture:scroll-step") {
            if self.scroll_steps == 0 {
                return Ok(serde_json::json!({ "done": true }));
            }
            self.scroll_steps -= 1;
            return Ok(serde_json::json!({ "done": false }));
        }
        if script.contains("rfcapture:click-step") {
            // Forward clicks use the "Next page" selector, rewinds the "Previous page" one.
            if script.contains("Next page") {
                if self.current_page >= self.next_clicks {
                    return Ok(serde_json::json!({ "done": true }));
                }
                self.current_page += 1;
            } else {
                if self.current_page == 0 {
                    return Ok(serde_json::json!({ "done": true }));
                }
                self.current_page -= 1;
            }
            return Ok(serde_json::json!({ "done": false }));
        }
        if script.contains("rfcapture:rasterize") {
            return Ok(serde_json::Value::Array(self.images.clone()));
        }
        Err(Error::ScriptError(format!("unexpected script: {}", script)))
    }

    fn wait_for_selector(&mut self, _selector: &str, timeout: Duration) -> Result<bool> {
        if !self.viewer_present {
            self.slept.push(timeout);
        }
        Ok(self.viewer_present)
    }

    fn sleep(&mut self, duration: Duration) {
        self.slept.push(duration);
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

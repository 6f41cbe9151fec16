//! Page image extraction
//!
//! A [`PageImageSource`] decides which `<img>` elements are document pages and
//! in which order. The extractor rasterizes each of them in the page at its
//! natural pixel size and encodes the bitmaps to JPEG on the Rust side.

use crate::session::{js_string, Session};
use crate::{CaptureConfig, Error, Result};
use base64::Engine as Base64Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use log::{debug, info, warn};
use serde::Deserialize;

/// Which page-image detection strategy to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Query the viewer's page containers in DOM order
    #[default]
    Structural,
    /// Collect blob-backed images and order them by vertical position
    BlobScan,
}

/// A rendered page in viewer order.
///
/// `jpeg` holds the encoded bitmap; `width` and `height` are its pixel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub ordinal: usize,
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Capability that locates the page images of a viewer.
pub trait PageImageSource {
    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// JavaScript expression evaluating to an array of image elements in reading order
    fn locate_expression(&self, config: &CaptureConfig) -> String;
}

/// Reads the `<img>` inside each known page container of the viewer.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralSource;

impl PageImageSource for StructuralSource {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn locate_expression(&self, config: &CaptureConfig) -> String {
        r#"(function() {
            const root = document.querySelector({{VIEWER}});
            if (!root) return [];
            return Array.from(root.querySelectorAll({{PAGE}}))
                .map(function(page) { return page.querySelector('img'); })
                .filter(function(img) { return img !== null; });
        })()"#
            .replace("{{VIEWER}}", &js_string(&config.viewer_selector))
            .replace("{{PAGE}}", &js_string(&config.page_selector))
    }
}

/// Treats every image backed by a `blob:` URL as viewer-rendered content and
/// recovers reading order from the vertical position of each image.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlobScanSource;

impl PageImageSource for BlobScanSource {
    fn name(&self) -> &'static str {
        "blob-scan"
    }

    fn locate_expression(&self, _config: &CaptureConfig) -> String {
        r#"Array.from(document.getElementsByTagName('img'))
            .filter(function(img) { return /^blob:/.test(img.src); })
            .sort(function(a, b) {
                return a.getBoundingClientRect().top - b.getBoundingClientRect().top;
            })"#
            .to_string()
    }
}

/// Source implementation for a configured kind.
pub fn source_for(kind: SourceKind) -> Box<dyn PageImageSource> {
    match kind {
        SourceKind::Structural => Box::new(StructuralSource),
        SourceKind::BlobScan => Box::new(BlobScanSource),
    }
}

#[derive(Debug, Deserialize)]
struct RasterizedImage {
    width: u32,
    height: u32,
    data: Option<String>,
    error: Option<String>,
}

/// Rasterize every located image and return the pages in located order.
///
/// Fails with `NoPagesDetected` when the source finds no image, or when none
/// of the found images carries pixel content.
pub fn extract_pages<S: Session>(
    session: &mut S,
    source: &dyn PageImageSource,
    config: &CaptureConfig,
) -> Result<Vec<RenderedPage>> {
    let script = rasterize_script(&source.locate_expression(config));
    let images: Vec<RasterizedImage> = session.evaluate_as(&script, true)?;

    if images.is_empty() {
        return Err(Error::NoPagesDetected(format!(
            "the {} source found no page images",
            source.name()
        )));
    }
    debug!("{} source located {} page images", source.name(), images.len());

    let mut pages = Vec::with_capacity(images.len());
    for (index, raw) in images.into_iter().enumerate() {
        let data = match (raw.data, raw.error) {
            (Some(data), _) => data,
            (None, error) => {
                warn!(
                    "Skipping image {} ({}x{}): {}",
                    index,
                    raw.width,
                    raw.height,
                    error.as_deref().unwrap_or("no data")
                );
                continue;
            }
        };

        let encoded = decode_data_url(&data)
            .and_then(|png| encode_page(&png, config.scale, config.jpeg_quality));
        match encoded {
            Ok(Some((width, height, jpeg))) => pages.push(RenderedPage {
                ordinal: pages.len(),
                width,
                height,
                jpeg,
            }),
            Ok(None) => warn!("Skipping image {}: no pixel content", index),
            Err(e) => warn!("Skipping image {}: {}", index, e),
        }
    }

    if pages.is_empty() {
        return Err(Error::NoPagesDetected(format!(
            "the {} source found images but none had pixel content",
            source.name()
        )));
    }

    info!("Extracted {} pages", pages.len());
    Ok(pages)
}

/// Decode a lossless page bitmap, optionally upsample it by an integer
/// factor, and encode it as JPEG. Returns `None` for fully transparent bitmaps.
pub fn encode_page(bitmap: &[u8], scale: u32, quality: u8) -> Result<Option<(u32, u32, Vec<u8>)>> {
    let decoded = image::load_from_memory(bitmap)?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 || is_blank(&decoded) {
        return Ok(None);
    }

    let decoded = if scale > 1 {
        let (scaled_width, scaled_height) = width
            .checked_mul(scale)
            .zip(height.checked_mul(scale))
            .ok_or_else(|| {
                Error::ImageError(format!("{}x{} page cannot be scaled by {}", width, height, scale))
            })?;
        decoded.resize_exact(scaled_width, scaled_height, FilterType::Lanczos3)
    } else {
        decoded
    };

    let rgb = flatten_on_white(&decoded);
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&rgb)?;
    Ok(Some((rgb.width(), rgb.height(), jpeg)))
}

fn is_blank(image: &DynamicImage) -> bool {
    image.color().has_alpha() && image.to_rgba8().pixels().all(|p| p.0[3] == 0)
}

// JPEG has no alpha channel; composite transparent areas onto white paper.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn decode_data_url(data: &str) -> Result<Vec<u8>> {
    let payload = data
        .split_once(";base64,")
        .map(|(_, payload)| payload)
        .ok_or_else(|| Error::ImageError("page bitmap is not a base64 data URL".into()))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::ImageError(format!("invalid base64 page bitmap: {}", e)))
}

fn rasterize_script(locate: &str) -> String {
    r#"/* rfcapture:rasterize */ (async function() {
        const images = {{LOCATE}};
        const pages = [];
        for (const img of images) {
            if (!img.complete) {
                try { await img.decode(); } catch (e) {}
            }
            const width = img.naturalWidth;
            const height = img.naturalHeight;
            if (!width || !height) {
                pages.push({ width: 0, height: 0, data: null, error: 'image has no pixel content' });
                continue;
            }
            const canvas = document.createElement('canvas');
            canvas.width = width;
            canvas.height = height;
            const context = canvas.getContext('2d');
            if (!context) {
                pages.push({ width: width, height: height, data: null, error: '2d context unavailable' });
                continue;
            }
            try {
                context.drawImage(img, 0, 0, width, height);
                pages.push({ width: width, height: height, data: canvas.toDataURL('image/png'), error: null });
            } catch (e) {
                pages.push({ width: width, height: height, data: null, error: String(e) });
            }
        }
        return pages;
    })()"#
        .replace("{{LOCATE}}", locate)
}

//! PDF assembly: one output page per rendered page, scaled to fit and centered.

use crate::extract::RenderedPage;
use crate::{Error, Result};
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};
use log::{debug, warn};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Cursor;

const POINTS_PER_MM: f64 = 72.0 / 25.4;

/// Page orientation, decided per page from the image's own aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// `Landscape` when strictly wider than tall.
    pub fn of(width: u32, height: u32) -> Self {
        if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

/// Physical page size in millimetres, portrait edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width_mm: 210.0,
        height_mm: 297.0,
    };

    pub const LETTER: PageSize = PageSize {
        width_mm: 215.9,
        height_mm: 279.4,
    };

    /// Page width and height in PDF points for the given orientation.
    pub fn dimensions(&self, orientation: Orientation) -> (f64, f64) {
        let short = self.width_mm.min(self.height_mm) * POINTS_PER_MM;
        let long = self.width_mm.max(self.height_mm) * POINTS_PER_MM;
        match orientation {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::A4
    }
}

/// Placement of one image on its output page, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub orientation: Orientation,
    pub page_width: f64,
    pub page_height: f64,
    pub draw_width: f64,
    pub draw_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl PageLayout {
    /// Largest aspect-preserving rectangle for the image, centered on a page
    /// oriented like the image.
    pub fn fit(image_width: u32, image_height: u32, page_size: PageSize) -> Self {
        let orientation = Orientation::of(image_width, image_height);
        let (page_width, page_height) = page_size.dimensions(orientation);

        let image_aspect = f64::from(image_width) / f64::from(image_height);
        let page_aspect = page_width / page_height;

        let (draw_width, draw_height) = if image_aspect > page_aspect {
            (page_width, page_width / image_aspect)
        } else {
            (page_height * image_aspect, page_height)
        };

        Self {
            orientation,
            page_width,
            page_height,
            draw_width,
            draw_height,
            offset_x: (page_width - draw_width) / 2.0,
            offset_y: (page_height - draw_height) / 2.0,
        }
    }
}

/// Finished PDF plus the layout chosen for every page.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub layouts: Vec<PageLayout>,
}

impl AssembledDocument {
    pub fn page_count(&self) -> usize {
        self.layouts.len()
    }
}

/// Handle to the PDF encoder; obtained once per capture and handed to the
/// assembly step.
#[derive(Debug, Clone)]
pub struct PdfEncoder {
    page_size: PageSize,
    producer: String,
}

impl PdfEncoder {
    pub fn load(page_size: PageSize) -> Self {
        Self {
            page_size,
            producer: format!("rfcapture {}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// Build a PDF from pages in ordinal order.
    ///
    /// Each JPEG is embedded as-is (`DCTDecode`, no re-encoding). Pages whose
    /// bitmap cannot be read are skipped with a warning; if that leaves no
    /// page at all the assembly fails.
    pub fn assemble(&self, pages: &[RenderedPage]) -> Result<AssembledDocument> {
        if pages.is_empty() {
            return Err(Error::NoPagesDetected("nothing to assemble".into()));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        let mut layouts = Vec::with_capacity(pages.len());

        for page in pages {
            let (width, height, color_space) = match probe_jpeg(&page.jpeg) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Skipping page {}: {}", page.ordinal, e);
                    continue;
                }
            };

            let layout = PageLayout::fit(width, height, self.page_size);
            let name = format!("Im{}", page.ordinal);

            let image_id = doc.add_object(
                Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => i64::from(width),
                        "Height" => i64::from(height),
                        "ColorSpace" => color_space,
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    page.jpeg.clone(),
                )
                .with_compression(false),
            );

            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            real(layout.draw_width),
                            0.into(),
                            0.into(),
                            real(layout.draw_height),
                            real(layout.offset_x),
                            real(layout.offset_y),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! {
                        name.clone() => image_id,
                    },
                },
                "MediaBox" => vec![0.into(), 0.into(), real(layout.page_width), real(layout.page_height)],
            });

            kids.push(Object::Reference(page_id));
            layouts.push(layout);
            debug!(
                "Page {}: {}x{} px, {:?}, drawn {:.1}x{:.1} pt at ({:.1}, {:.1})",
                page.ordinal,
                width,
                height,
                layout.orientation,
                layout.draw_width,
                layout.draw_height,
                layout.offset_x,
                layout.offset_y
            );
        }

        if layouts.is_empty() {
            return Err(Error::AssemblyFailure(format!(
                "none of the {} extracted pages could be embedded",
                pages.len()
            )));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Producer" => Object::string_literal(self.producer.as_str()),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| Error::AssemblyFailure(format!("pdf write failed: {}", e)))?;

        Ok(AssembledDocument { bytes, layouts })
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// Pixel size and PDF color space of a JPEG, read from its header.
fn probe_jpeg(jpeg: &[u8]) -> Result<(u32, u32, &'static str)> {
    let decoder = JpegDecoder::new(Cursor::new(jpeg))?;
    let (width, height) = decoder.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::ImageError("empty bitmap".into()));
    }
    let color_space = match decoder.color_type() {
        ColorType::L8 | ColorType::La8 => "DeviceGray",
        _ => "DeviceRGB",
    };
    Ok((width, height, color_space))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::RgbImage;

    const EPS: f64 = 1e-6;

    fn jpeg_page(ordinal: usize, width: u32, height: u32) -> RenderedPage {
        let img = RgbImage::from_pixel(width, height, image::Rgb([120, 80, 40]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode_image(&img)
            .unwrap();
        RenderedPage {
            ordinal,
            width,
            height,
            jpeg,
        }
    }

    #[test]
    fn orientation_follows_aspect_ratio() {
        assert_eq!(Orientation::of(300, 200), Orientation::Landscape);
        assert_eq!(Orientation::of(200, 300), Orientation::Portrait);
        assert_eq!(Orientation::of(200, 200), Orientation::Portrait);
    }

    #[test]
    fn a4_dimensions_swap_for_landscape() {
        let (w, h) = PageSize::A4.dimensions(Orientation::Portrait);
        assert!((w - 595.2756).abs() < 1e-3);
        assert!((h - 841.8898).abs() < 1e-3);
        let (lw, lh) = PageSize::A4.dimensions(Orientation::Landscape);
        assert_eq!((lw, lh), (h, w));
    }

    #[test]
    fn wide_image_is_width_constrained_and_centered() {
        // 2:1 on landscape A4 (aspect ~1.414) hits the width first
        let layout = PageLayout::fit(2000, 1000, PageSize::A4);
        assert_eq!(layout.orientation, Orientation::Landscape);
        assert!((layout.draw_width - layout.page_width).abs() < EPS);
        assert!((layout.draw_height - layout.page_width / 2.0).abs() < EPS);
        assert!(layout.offset_x.abs() < EPS);
        assert!((layout.offset_y - (layout.page_height - layout.draw_height) / 2.0).abs() < EPS);
    }

    #[test]
    fn tall_image_is_height_constrained_and_centered() {
        let layout = PageLayout::fit(1000, 3000, PageSize::A4);
        assert_eq!(layout.orientation, Orientation::Portrait);
        assert!((layout.draw_height - layout.page_height).abs() < EPS);
        assert!((layout.draw_width - layout.page_height / 3.0).abs() < EPS);
        assert!((layout.offset_x - (layout.page_width - layout.draw_width) / 2.0).abs() < EPS);
        assert!(layout.offset_y.abs() < EPS);
    }

    #[test]
    fn drawn_rect_stays_inside_page() {
        for (w, h) in [(1, 1), (1, 5000), (5000, 1), (850, 1100), (1100, 850), (1240, 1754)] {
            let l = PageLayout::fit(w, h, PageSize::LETTER);
            assert!(l.offset_x >= -EPS && l.offset_y >= -EPS, "{}x{}", w, h);
            assert!(l.offset_x + l.draw_width <= l.page_width + EPS, "{}x{}", w, h);
            assert!(l.offset_y + l.draw_height <= l.page_height + EPS, "{}x{}", w, h);
        }
    }

    #[test]
    fn assemble_keeps_order_and_mixed_orientation() {
        let pages = vec![jpeg_page(0, 60, 80), jpeg_page(1, 80, 60), jpeg_page(2, 60, 80)];
        let encoder = PdfEncoder::load(PageSize::A4);
        let doc = encoder.assemble(&pages).unwrap();
        assert_eq!(doc.page_count(), 3);
        let orientations: Vec<Orientation> = doc.layouts.iter().map(|l| l.orientation).collect();
        assert_eq!(
            orientations,
            vec![Orientation::Portrait, Orientation::Landscape, Orientation::Portrait]
        );

        let parsed = Document::load_mem(&doc.bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 3);
    }

    #[test]
    fn assemble_twice_yields_identical_layouts() {
        let pages = vec![jpeg_page(0, 64, 48), jpeg_page(1, 48, 64)];
        let encoder = PdfEncoder::load(PageSize::A4);
        let first = encoder.assemble(&pages).unwrap();
        let second = encoder.assemble(&pages).unwrap();
        assert_eq!(first.layouts, second.layouts);
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = PdfEncoder::load(PageSize::A4).assemble(&[]).unwrap_err();
        assert!(matches!(err, Error::NoPagesDetected(_)));
    }

    #[test]
    fn unreadable_pages_only_is_assembly_failure() {
        let broken = RenderedPage {
            ordinal: 0,
            width: 10,
            height: 10,
            jpeg: b"not a jpeg".to_vec(),
        };
        let err = PdfEncoder::load(PageSize::A4).assemble(&[broken]).unwrap_err();
        assert!(matches!(err, Error::AssemblyFailure(_)));
    }

    #[test]
    fn unreadable_page_is_skipped() {
        let broken = RenderedPage {
            ordinal: 1,
            width: 10,
            height: 10,
            jpeg: vec![0xFF, 0xD8, 0x00],
        };
        let pages = vec![jpeg_page(0, 40, 40), broken, jpeg_page(2, 40, 40)];
        let doc = PdfEncoder::load(PageSize::A4).assemble(&pages).unwrap();
        assert_eq!(doc.page_count(), 2);
    }
}

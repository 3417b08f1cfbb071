//! PDF rasterization with Google PDFium.
//!
//! The upstream `Pdfium` handle is `!Send`, so it is bound per call and
//! dropped before returning. Repeated binds hit the dynamic loader cache.

use std::path::PathBuf;

use image::{DynamicImage, Rgb, RgbImage};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfPageRenderer;
use super::PipelineError;

/// Longest rendered edge in pixels. Large drawing sheets at high DPI are
/// scaled down to this, keeping their aspect ratio.
pub const MAX_RENDER_EDGE: u32 = 5000;

const POINTS_PER_INCH: f32 = 72.0;

/// Env var naming an explicit PDFium library file.
pub const PDFIUM_PATH_VAR: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// Pixel size of a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
    /// True when the page was scaled down to fit `MAX_RENDER_EDGE`.
    pub capped: bool,
}

impl RenderSize {
    /// Size of a page of `width_pt` x `height_pt` points rendered at `dpi`.
    pub fn for_page(width_pt: f32, height_pt: f32, dpi: u32) -> Self {
        let px_per_pt = dpi as f32 / POINTS_PER_INCH;
        let w = (width_pt * px_per_pt).max(1.0);
        let h = (height_pt * px_per_pt).max(1.0);
        let longest = w.max(h);

        if longest <= MAX_RENDER_EDGE as f32 {
            return Self {
                width: w as u32,
                height: h as u32,
                capped: false,
            };
        }

        let shrink = MAX_RENDER_EDGE as f32 / longest;
        let fit = |edge: f32| ((edge * shrink).round() as u32).clamp(1, MAX_RENDER_EDGE);
        let (width, height) = if w >= h {
            (MAX_RENDER_EDGE, fit(h))
        } else {
            (fit(w), MAX_RENDER_EDGE)
        };
        Self {
            width,
            height,
            capped: true,
        }
    }
}

/// Renders PDF pages through a dynamically loaded PDFium.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Fails when no PDFium library can be bound. Search order: the
    /// `PDFIUM_DYNAMIC_LIB_PATH` file, then the executable's directory and
    /// its `pdfium/lib`, then the system library path.
    pub fn new() -> Result<Self, PipelineError> {
        bind_pdfium()?;
        Ok(Self)
    }
}

/// Directories next to the executable that may hold the PDFium library.
fn bundled_library_dirs() -> Vec<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .map(|dir| vec![dir.join("pdfium").join("lib"), dir])
        .unwrap_or_default()
}

fn bind_pdfium() -> Result<Pdfium, PipelineError> {
    if let Ok(path) = std::env::var(PDFIUM_PATH_VAR) {
        debug!(%path, "Binding PDFium from {PDFIUM_PATH_VAR}");
        return Pdfium::bind_to_library(&path).map(Pdfium::new).map_err(|e| {
            PipelineError::RendererUnavailable(format!("cannot load PDFium from {path}: {e}"))
        });
    }

    for dir in bundled_library_dirs() {
        let candidate =
            Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&candidate) {
            debug!(dir = %dir.display(), "Bound bundled PDFium");
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library().map(Pdfium::new).map_err(|e| {
        PipelineError::RendererUnavailable(format!(
            "no PDFium library found (set {PDFIUM_PATH_VAR} or install PDFium): {e}"
        ))
    })
}

/// Encrypted documents are reported separately so users know to unlock them.
fn classify_open_error(e: PdfiumError) -> PipelineError {
    let text = e.to_string().to_lowercase();
    if text.contains("password") || text.contains("encrypt") {
        PipelineError::PdfEncrypted
    } else {
        PipelineError::PdfRendering {
            page: 0,
            reason: format!("cannot open PDF: {e}"),
        }
    }
}

/// Bind PDFium, open `pdf_bytes` and hand the document to `f`.
fn with_document<T>(
    pdf_bytes: &[u8],
    f: impl FnOnce(&PdfDocument) -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(classify_open_error)?;
    f(&document)
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, PipelineError> {
        with_document(pdf_bytes, |document| Ok(document.pages().len() as usize))
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<DynamicImage, PipelineError> {
        with_document(pdf_bytes, |document| {
            let pages = document.pages();
            let page = u16::try_from(page_number)
                .ok()
                .and_then(|index| pages.get(index).ok())
                .ok_or_else(|| PipelineError::PdfRendering {
                    page: page_number,
                    reason: format!("no page {page_number} in a {}-page document", pages.len()),
                })?;

            let size = RenderSize::for_page(page.width().value, page.height().value, dpi);
            if size.capped {
                warn!(
                    page = page_number,
                    dpi,
                    width = size.width,
                    height = size.height,
                    "Sheet scaled down to {MAX_RENDER_EDGE}px"
                );
            }

            let render_config = PdfRenderConfig::new()
                .set_target_width(size.width as i32)
                .set_maximum_height(size.height as i32);
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| PipelineError::PdfRendering {
                    page: page_number,
                    reason: e.to_string(),
                })?;

            let image = bitmap.as_image();
            debug!(
                page = page_number,
                dpi,
                width = image.width(),
                height = image.height(),
                "Rasterized PDF page"
            );
            Ok(image)
        })
    }
}

/// Stand-in used when PDFium cannot be loaded at startup. Image uploads
/// still work; every PDF fails as a server-side error.
pub struct UnavailablePdfRenderer {
    reason: String,
}

impl UnavailablePdfRenderer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PdfPageRenderer for UnavailablePdfRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, PipelineError> {
        Err(PipelineError::RendererUnavailable(self.reason.clone()))
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        _page_number: usize,
        _dpi: u32,
    ) -> Result<DynamicImage, PipelineError> {
        Err(PipelineError::RendererUnavailable(self.reason.clone()))
    }
}

/// In-memory renderer for tests: every document has `page_count` pages,
/// each rendering to the same bitmap.
pub struct MockPdfPageRenderer {
    page_count: usize,
    page: RgbImage,
}

impl MockPdfPageRenderer {
    /// Blank white page.
    pub fn new(page_count: usize) -> Self {
        Self::with_page(page_count, RgbImage::from_pixel(85, 110, Rgb([255, 255, 255])))
    }

    pub fn with_page(page_count: usize, page: RgbImage) -> Self {
        Self { page_count, page }
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, PipelineError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<DynamicImage, PipelineError> {
        if page_number >= self.page_count {
            return Err(PipelineError::PdfRendering {
                page: page_number,
                reason: format!("no page {page_number} in a {}-page document", self.page_count),
            });
        }
        Ok(DynamicImage::ImageRgb8(self.page.clone()))
    }
}

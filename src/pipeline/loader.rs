//! Turns uploaded bytes into a single RGB bitmap.
//!
//! PDFs are rasterized (first page only); everything else is decoded as a
//! raster image. The result is always normalized to 3-channel RGB8.

use image::RgbImage;
use tracing::debug;

use super::types::PdfPageRenderer;
use super::PipelineError;

/// True when the filename carries a `.pdf` extension (case-insensitive).
pub fn is_pdf(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".pdf")
}

/// Load the bitmap for one uploaded file.
pub fn load_image(
    content: &[u8],
    filename: &str,
    renderer: &dyn PdfPageRenderer,
    dpi: u32,
) -> Result<RgbImage, PipelineError> {
    if content.is_empty() {
        return Err(PipelineError::ImageDecode("file is empty".into()));
    }

    let image = if is_pdf(filename) {
        let pages = renderer.page_count(content)?;
        if pages == 0 {
            return Err(PipelineError::EmptyDocument);
        }
        debug!(filename, pages, dpi, "Rasterizing first PDF page");
        renderer.render_page(content, 0, dpi)?
    } else {
        image::load_from_memory(content).map_err(|e| PipelineError::ImageDecode(e.to_string()))?
    };

    let rgb = image.to_rgb8();
    debug!(
        filename,
        width = rgb.width(),
        height = rgb.height(),
        "Loaded image"
    );
    Ok(rgb)
}

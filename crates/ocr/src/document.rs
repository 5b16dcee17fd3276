use tracing::debug;

use crate::recognizer::{OcrBackend, OcrError};
use crate::types::OcrOutput;

/// Renders a paged document into one encoded image per page, in page order.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, document: &[u8]) -> Result<Vec<Vec<u8>>, OcrError>;
}

/// Wraps an image backend so PDFs are rendered page by page and each page
/// recognized separately. Everything else goes straight to the backend.
pub struct PdfRecognizer<R, P> {
    inner: R,
    pages: P,
}

impl<R: OcrBackend, P: PageRasterizer> PdfRecognizer<R, P> {
    pub fn new(inner: R, pages: P) -> Self {
        Self { inner, pages }
    }
}

impl<R: OcrBackend, P: PageRasterizer> OcrBackend for PdfRecognizer<R, P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn recognize(&self, image_bytes: &[u8]) -> Result<OcrOutput, OcrError> {
        self.inner.recognize(image_bytes)
    }

    fn recognize_document(&self, data: &[u8], ext: &str) -> Result<Vec<OcrOutput>, OcrError> {
        if !ext.eq_ignore_ascii_case("pdf") {
            return self.inner.recognize_document(data, ext);
        }
        let pages = self.pages.rasterize(data)?;
        debug!(pages = pages.len(), "pdf rasterized");
        pages.iter().map(|page| self.inner.recognize(page)).collect()
    }
}

// ── PDFium rasterizer (optional, gated behind `pdf` feature) ──────────────────

#[cfg(feature = "pdf")]
pub mod pdfium_backend {
    use super::PageRasterizer;
    use crate::recognizer::OcrError;
    use pdfium_render::prelude::*;
    use std::io::Cursor;

    /// Target render width in pixels; tall pages are capped at the same size.
    const RENDER_WIDTH: i32 = 2000;

    /// Binds the PDFium library next to the binary, else the system copy.
    #[derive(Debug, Default)]
    pub struct PdfiumRasterizer;

    impl PageRasterizer for PdfiumRasterizer {
        fn rasterize(&self, document: &[u8]) -> Result<Vec<Vec<u8>>, OcrError> {
            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| OcrError::Engine(format!("failed to initialize PDFium: {e}")))?;
            let pdfium = Pdfium::new(bindings);
            let doc = pdfium
                .load_pdf_from_byte_slice(document, None)
                .map_err(|e| OcrError::ImageDecode(format!("failed to load PDF: {e}")))?;

            let config = PdfRenderConfig::new()
                .set_target_width(RENDER_WIDTH)
                .set_maximum_height(RENDER_WIDTH * 2);

            let mut pages = Vec::new();
            for (index, page) in doc.pages().iter().enumerate() {
                let bitmap = page
                    .render_with_config(&config)
                    .map_err(|e| OcrError::ImageDecode(format!("failed to render page {}: {e}", index + 1)))?;
                let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
                let rgba = image::RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
                    .ok_or_else(|| OcrError::ImageDecode(format!("page {} has a short bitmap", index + 1)))?;
                let mut png = Vec::new();
                rgba.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                    .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
                pages.push(png);
            }
            Ok(pages)
        }
    }
}

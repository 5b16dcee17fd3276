use thiserror::Error;
use tracing::debug;

use crate::types::OcrOutput;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("No OCR engine available — build with the `tesseract` feature")]
    NotAvailable,
    #[error("Unsupported document type: .{0}")]
    UnsupportedDocument(String),
}

/// Abstraction over an OCR backend.
/// Implementations accept raw PNG/JPEG image bytes and return cleaned lines
/// with per-line confidences.
pub trait OcrBackend: Send + Sync {
    /// Short engine name reported alongside extraction results.
    fn name(&self) -> &str;

    fn recognize(&self, image_bytes: &[u8]) -> Result<OcrOutput, OcrError>;

    /// Recognize a possibly multi-page document, one output per page in
    /// page order. Image backends treat the input as a single page and
    /// cannot rasterize PDFs.
    fn recognize_document(&self, data: &[u8], ext: &str) -> Result<Vec<OcrOutput>, OcrError> {
        if ext.eq_ignore_ascii_case("pdf") {
            return Err(OcrError::UnsupportedDocument(ext.to_lowercase()));
        }
        Ok(vec![self.recognize(data)?])
    }
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn recognize(&self, image_bytes: &[u8]) -> Result<OcrOutput, OcrError> {
        (**self).recognize(image_bytes)
    }

    fn recognize_document(&self, data: &[u8], ext: &str) -> Result<Vec<OcrOutput>, OcrError> {
        (**self).recognize_document(data, ext)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set result — useful for unit testing the invoice and
/// labeling pipelines without requiring Tesseract to be installed.
pub struct MockRecognizer {
    pub output: OcrOutput,
}

impl MockRecognizer {
    /// Every non-empty line of `text` is reported with confidence 0.9.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_confidence(text, 0.9)
    }

    pub fn with_confidence(text: impl Into<String>, confidence: f32) -> Self {
        Self { output: OcrOutput::from_text(text, confidence) }
    }

    pub fn from_output(output: OcrOutput) -> Self {
        Self { output }
    }
}

impl OcrBackend for MockRecognizer {
    fn name(&self) -> &str {
        "mock"
    }

    fn recognize(&self, _image_bytes: &[u8]) -> Result<OcrOutput, OcrError> {
        Ok(self.output.clone())
    }
}

/// Stand-in used when the binary was built without an OCR engine.
pub struct UnavailableRecognizer;

impl OcrBackend for UnavailableRecognizer {
    fn name(&self) -> &str {
        "none"
    }

    fn recognize(&self, _image_bytes: &[u8]) -> Result<OcrOutput, OcrError> {
        Err(OcrError::NotAvailable)
    }
}

// ── Fallback chaining ─────────────────────────────────────────────────────────

/// Average line confidence under which the primary result is discarded.
pub const FALLBACK_MIN_CONFIDENCE: f32 = 0.55;

/// Tries `primary` first and falls back to `secondary` when the primary
/// errors, finds no lines, or is not confident enough.
pub struct FallbackRecognizer<P, S> {
    primary: P,
    secondary: S,
    min_confidence: f32,
}

impl<P: OcrBackend, S: OcrBackend> FallbackRecognizer<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary, min_confidence: FALLBACK_MIN_CONFIDENCE }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    fn accept(&self, output: &OcrOutput) -> bool {
        !output.lines.is_empty() && output.avg_confidence() >= self.min_confidence
    }
}

impl<P: OcrBackend, S: OcrBackend> OcrBackend for FallbackRecognizer<P, S> {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn recognize(&self, image_bytes: &[u8]) -> Result<OcrOutput, OcrError> {
        match self.primary.recognize(image_bytes) {
            Ok(output) if self.accept(&output) => return Ok(output),
            Ok(output) => debug!(
                engine = self.primary.name(),
                lines = output.lines.len(),
                avg_conf = output.avg_confidence(),
                "primary OCR result rejected"
            ),
            Err(e) => debug!(engine = self.primary.name(), "primary OCR failed: {e}"),
        }
        self.secondary.recognize(image_bytes)
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use crate::types::OcrOutput;
    use leptess::{LepTess, Variable};

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
        page_seg_mode: Option<String>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string(), page_seg_mode: None }
        }

        /// Override Tesseract's page segmentation mode, e.g. "11" for sparse
        /// text on product packaging.
        pub fn with_page_seg_mode(mut self, psm: &str) -> Self {
            self.page_seg_mode = Some(psm.to_string());
            self
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn name(&self) -> &str {
            "tesseract"
        }

        fn recognize(&self, image_bytes: &[u8]) -> Result<OcrOutput, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            if let Some(psm) = &self.page_seg_mode {
                lt.set_variable(Variable::TesseditPagesegMode, psm)
                    .map_err(|e| OcrError::Engine(e.to_string()))?;
            }
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            let text = lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))?;
            // Tesseract reports a page-level mean in 0..=100; every line shares it.
            let confidence = lt.mean_text_conf().clamp(0, 100) as f32 / 100.0;
            Ok(OcrOutput::from_text(text, confidence))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_preset_lines() {
        let r = MockRecognizer::new("WHOLE MILK 2L\n\nORGANIC APPLES");
        let out = r.recognize(b"fake image data").unwrap();
        assert_eq!(out.lines, vec!["WHOLE MILK 2L", "ORGANIC APPLES"]);
        assert_eq!(out.confidences, vec![0.9, 0.9]);
    }

    #[test]
    fn mock_ignores_image_content() {
        let r = MockRecognizer::new("hello");
        assert_eq!(r.recognize(b"anything").unwrap().lines, vec!["hello"]);
        assert_eq!(r.recognize(b"").unwrap().lines, vec!["hello"]);
    }

    #[test]
    fn image_backends_reject_pdf_documents() {
        let r = MockRecognizer::new("hello");
        assert!(matches!(
            r.recognize_document(b"%PDF-1.7", "PDF"),
            Err(OcrError::UnsupportedDocument(ext)) if ext == "pdf"
        ));
        assert_eq!(r.recognize_document(b"img", "jpg").unwrap().len(), 1);
    }

    #[test]
    fn unavailable_backend_errors() {
        assert!(matches!(UnavailableRecognizer.recognize(b""), Err(OcrError::NotAvailable)));
    }

    #[test]
    fn fallback_keeps_confident_primary() {
        let r = FallbackRecognizer::new(
            MockRecognizer::with_confidence("primary text", 0.8),
            MockRecognizer::new("secondary text"),
        );
        assert_eq!(r.recognize(b"").unwrap().lines, vec!["primary text"]);
    }

    #[test]
    fn fallback_switches_on_low_confidence() {
        let r = FallbackRecognizer::new(
            MockRecognizer::with_confidence("pr1m4ry t3xt", 0.3),
            MockRecognizer::new("secondary text"),
        );
        assert_eq!(r.recognize(b"").unwrap().lines, vec!["secondary text"]);
    }

    #[test]
    fn fallback_switches_on_primary_error() {
        let r = FallbackRecognizer::new(UnavailableRecognizer, MockRecognizer::new("secondary"));
        assert_eq!(r.recognize(b"").unwrap().lines, vec!["secondary"]);
    }

    #[test]
    fn fallback_threshold_is_configurable() {
        let r = FallbackRecognizer::new(
            MockRecognizer::with_confidence("primary", 0.3),
            MockRecognizer::new("secondary"),
        )
        .with_min_confidence(0.2);
        assert_eq!(r.recognize(b"").unwrap().lines, vec!["primary"]);
    }

    #[test]
    fn boxed_backend_delegates() {
        let boxed: Box<dyn OcrBackend> = Box::new(MockRecognizer::new("boxed"));
        assert_eq!(boxed.name(), "mock");
        assert_eq!(boxed.recognize(b"").unwrap().lines, vec!["boxed"]);
    }
}

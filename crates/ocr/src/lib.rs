pub mod document;
pub mod invoice;
pub mod recognizer;
pub mod structure;
pub mod types;

pub use document::{PageRasterizer, PdfRecognizer};
pub use invoice::{extract_pages, InvoiceError, InvoiceReader};
pub use recognizer::{
    FallbackRecognizer, MockRecognizer, OcrBackend, OcrError, UnavailableRecognizer,
    FALLBACK_MIN_CONFIDENCE,
};
pub use structure::{line_to_row, normalize_common_errors, structure_items, LineRow};
pub use types::{InvoiceExtraction, OcrOutput};

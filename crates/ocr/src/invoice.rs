use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::recognizer::{OcrBackend, OcrError};
use crate::structure::structure_items;
use crate::types::{InvoiceExtraction, OcrOutput};
use shelfscan_core::round3;

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("Invoice unreadable. Please retry or upload a clearer image.")]
    Unreadable,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
}

/// Orchestrates: read → OCR each page → concatenate → structure rows.
pub struct InvoiceReader<R: OcrBackend> {
    recognizer: R,
}

impl<R: OcrBackend> InvoiceReader<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    /// Read and structure an invoice file on disk.
    pub fn read_file(&self, path: &Path) -> Result<InvoiceExtraction, InvoiceError> {
        let bytes = std::fs::read(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_lowercase();
        self.read_bytes(&bytes, &ext)
    }

    /// Read and structure raw document bytes.
    pub fn read_bytes(&self, data: &[u8], ext: &str) -> Result<InvoiceExtraction, InvoiceError> {
        let pages = self.recognizer.recognize_document(data, ext)?;
        let extraction = extract_pages(self.recognizer.name(), &pages)?;
        info!(
            method = %extraction.method,
            pages = pages.len(),
            lines = extraction.raw_lines.len(),
            avg_conf = extraction.avg_conf,
            "invoice structured"
        );
        Ok(extraction)
    }
}

/// Concatenate page outputs in page order and structure the result.
///
/// Returns `InvoiceError::Unreadable` when no page produced a single line.
pub fn extract_pages(method: &str, pages: &[OcrOutput]) -> Result<InvoiceExtraction, InvoiceError> {
    let mut lines = Vec::new();
    let mut confidences = Vec::new();
    for (page_no, page) in pages.iter().enumerate() {
        if page.confidences.len() < page.lines.len() {
            warn!(page = page_no + 1, "page is missing line confidences; using document average");
        }
        lines.extend(page.lines.iter().cloned());
        // Keep confidences aligned with their lines across page boundaries.
        confidences.extend(
            (0..page.lines.len()).map(|i| page.confidences.get(i).copied()),
        );
    }

    if lines.is_empty() {
        return Err(InvoiceError::Unreadable);
    }

    let known: Vec<f32> = confidences.iter().flatten().copied().collect();
    let avg_conf = if known.is_empty() { 0.0 } else { known.iter().sum::<f32>() / known.len() as f32 };
    let aligned: Vec<f32> = confidences.iter().map(|c| c.unwrap_or(avg_conf)).collect();

    Ok(InvoiceExtraction {
        method: method.to_string(),
        items: structure_items(&lines, &aligned, avg_conf),
        raw_lines: lines,
        avg_conf: round3(avg_conf),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

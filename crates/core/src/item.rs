use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Line confidence below which an invoice item is flagged for review.
pub const REVIEW_CONFIDENCE: f32 = 0.70;

/// One structured row derived from a single OCR'd invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub item_no: Option<String>,
    pub desc: String,
    /// Always at least 1.
    pub qty: u32,
    pub price: Option<Decimal>,
    /// OCR confidence for the source line, rounded to 3 decimals.
    pub confidence: f32,
    pub needs_review: bool,
}

impl InvoiceLineItem {
    /// Build an item, clamping the confidence and deriving `needs_review`
    /// from the unrounded value.
    pub fn new(
        item_no: Option<String>,
        desc: String,
        qty: u32,
        price: Option<Decimal>,
        confidence: f32,
    ) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            item_no,
            desc,
            qty: qty.max(1),
            price,
            needs_review: confidence < REVIEW_CONFIDENCE,
            confidence: round3(confidence),
        }
    }

    pub fn has_description(&self) -> bool {
        !self.desc.trim().is_empty()
    }
}

/// Round to 3 decimal places, the precision used in every report.
pub fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

use serde::{Deserialize, Serialize};
use shelfscan_core::InvoiceLineItem;

/// What an OCR backend produced for one image or page.
///
/// Either field may be empty; both empty means the engine found no usable
/// text, not that it is confident there is none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub full_text: String,
    /// Cleaned, non-empty lines in reading order.
    pub lines: Vec<String>,
    /// Per-line confidence (0.0–1.0). May be shorter than `lines`.
    pub confidences: Vec<f32>,
}

impl OcrOutput {
    /// Build from raw engine text: lines are trimmed, inner whitespace
    /// collapsed, empties dropped. Every line gets `confidence`.
    pub fn from_text(full_text: impl Into<String>, confidence: f32) -> Self {
        let full_text = full_text.into();
        let lines = clean_lines(full_text.lines());
        let confidences = vec![confidence.clamp(0.0, 1.0); lines.len()];
        Self { full_text, lines, confidences }
    }

    pub fn from_lines(lines: Vec<(String, f32)>) -> Self {
        let (lines, confidences): (Vec<String>, Vec<f32>) = lines
            .into_iter()
            .filter_map(|(text, conf)| {
                let text = collapse_whitespace(&text);
                (!text.is_empty()).then(|| (text, conf.clamp(0.0, 1.0)))
            })
            .unzip();
        let full_text = lines.join("\n");
        Self { full_text, lines, confidences }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.full_text.trim().is_empty()
    }

    /// Mean of the per-line confidences, or 0.0 when there are none.
    pub fn avg_confidence(&self) -> f32 {
        if self.confidences.is_empty() {
            return 0.0;
        }
        self.confidences.iter().sum::<f32>() / self.confidences.len() as f32
    }

    /// Text used to match a product photo: the lines joined by a space, or
    /// the raw text when line segmentation produced nothing.
    pub fn query_text(&self) -> String {
        if self.lines.is_empty() {
            self.full_text.clone()
        } else {
            self.lines.join(" ")
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    lines.map(collapse_whitespace).filter(|l| !l.is_empty()).collect()
}

/// The structured result of reading an invoice document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceExtraction {
    /// Backend that produced the text.
    pub method: String,
    pub items: Vec<InvoiceLineItem>,
    pub raw_lines: Vec<String>,
    /// Document-wide mean line confidence, rounded to 3 decimals.
    pub avg_conf: f32,
}

impl InvoiceExtraction {
    /// Non-empty item descriptions in invoice order: the candidate set for
    /// product matching. Duplicates are kept.
    pub fn descriptions(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|it| it.has_description())
            .map(|it| it.desc.clone())
            .collect()
    }
}

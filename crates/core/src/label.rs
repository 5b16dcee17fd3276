use serde::{Deserialize, Serialize};
use std::fmt;

/// Label written for images the reviewer could not place.
pub const UNMATCHED_LABEL: &str = "Unmatched";

/// A candidate invoice description scored against an image's OCR text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub text: String,
    /// Similarity in the range 0.0–1.0.
    pub score: f32,
}

impl MatchCandidate {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self { text: text.into(), score: score.clamp(0.0, 1.0) }
    }
}

/// One row of the label table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub filename: String,
    pub label: String,
    pub confidence: f32,
    pub needs_review: bool,
}

impl LabelRecord {
    pub fn unmatched(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            label: UNMATCHED_LABEL.to_string(),
            confidence: 0.0,
            needs_review: true,
        }
    }

    pub fn is_unmatched(&self) -> bool {
        self.label == UNMATCHED_LABEL
    }
}

/// Terminal state reached by a single image.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelOutcome {
    AutoLabeled { label: String, score: f32 },
    UserLabeled { label: String, score: f32 },
    Unmatched,
    /// The image could not be read or recognized; recorded as unmatched.
    Failed { reason: String },
}

impl LabelOutcome {
    pub fn to_record(&self, filename: &str) -> LabelRecord {
        match self {
            LabelOutcome::AutoLabeled { label, score } => LabelRecord {
                filename: filename.to_string(),
                label: label.clone(),
                confidence: *score,
                needs_review: false,
            },
            LabelOutcome::UserLabeled { label, score } => LabelRecord {
                filename: filename.to_string(),
                label: label.clone(),
                confidence: *score,
                needs_review: true,
            },
            LabelOutcome::Unmatched | LabelOutcome::Failed { .. } => LabelRecord::unmatched(filename),
        }
    }

    /// Whether the image bytes belong in the dataset image store.
    pub fn is_accepted(&self) -> bool {
        matches!(self, LabelOutcome::AutoLabeled { .. } | LabelOutcome::UserLabeled { .. })
    }
}

impl fmt::Display for LabelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelOutcome::AutoLabeled { label, score } => write!(f, "[AUTO] {label} ({score:.2})"),
            LabelOutcome::UserLabeled { label, .. } => write!(f, "[USER] {label}"),
            LabelOutcome::Unmatched => write!(f, "[SKIP] {UNMATCHED_LABEL}"),
            LabelOutcome::Failed { reason } => write!(f, "[FAIL] {reason}"),
        }
    }
}

/// Aggregate counters for one labeling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub auto_labeled: usize,
    pub needs_review: usize,
    pub failed: usize,
}

impl RunStats {
    pub fn observe(&mut self, outcome: &LabelOutcome) {
        self.total += 1;
        match outcome {
            LabelOutcome::AutoLabeled { .. } => self.auto_labeled += 1,
            LabelOutcome::UserLabeled { .. } | LabelOutcome::Unmatched => self.needs_review += 1,
            LabelOutcome::Failed { .. } => {
                self.needs_review += 1;
                self.failed += 1;
            }
        }
    }
}

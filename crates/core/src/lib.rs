pub mod config;
pub mod item;
pub mod label;

pub use config::{ConfigError, LabelerConfig};
pub use item::{round3, InvoiceLineItem, REVIEW_CONFIDENCE};
pub use label::{LabelOutcome, LabelRecord, MatchCandidate, RunStats, UNMATCHED_LABEL};

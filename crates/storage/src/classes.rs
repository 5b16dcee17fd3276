use serde::Serialize;
use shelfscan_core::LabelRecord;
use std::collections::BTreeMap;

/// Class index for training export: every distinct non-`Unmatched` label,
/// sorted, numbered from zero.
pub fn class_map(records: &[LabelRecord]) -> BTreeMap<String, usize> {
    let mut labels: Vec<&str> = records
        .iter()
        .filter(|r| !r.is_unmatched() && !r.label.trim().is_empty())
        .map(|r| r.label.as_str())
        .collect();
    labels.sort_unstable();
    labels.dedup();
    labels.into_iter().enumerate().map(|(i, l)| (l.to_string(), i)).collect()
}

/// Filesystem-safe lowercase form of a label.
pub fn class_slug(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSummary {
    pub id: usize,
    pub label: String,
    pub slug: String,
    pub images: usize,
    pub needs_review: usize,
}

/// Per-class counts, in class-id order.
pub fn summarize(records: &[LabelRecord]) -> Vec<ClassSummary> {
    let map = class_map(records);
    let mut out: Vec<ClassSummary> = map
        .iter()
        .map(|(label, &id)| ClassSummary {
            id,
            label: label.clone(),
            slug: class_slug(label),
            images: 0,
            needs_review: 0,
        })
        .collect();
    for r in records {
        if let Some(&id) = map.get(&r.label) {
            out[id].images += 1;
            if r.needs_review {
                out[id].needs_review += 1;
            }
        }
    }
    out
}

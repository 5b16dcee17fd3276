use std::ops::Range;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use shelfscan_core::InvoiceLineItem;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// "100pc" is routinely read as "10p" / "10Op".
re!(re_misread_100pc, r"(?i)\b10O?p\b");
re!(re_leading_bracket, r"^[\{\[\(]+(\d)");
re!(re_disallowed, r"[^0-9a-zA-Z\s\./%:\-]");
re!(re_whitespace, r"\s+");

re!(re_item_no, r"^\s*(\d{4,})\b");
re!(re_price, r"([0-9]{1,3}(?:,[0-9]{3})*(?:\.[0-9]{2})|\d+\.[0-9]{2}|\d+)$");
re!(re_qty_label, r"(?i)\bqty\s*[:x]?\s*(\d+)\b");
re!(re_qty_times, r"(?i)\b(\d+)\s*x\b");

/// Fields parsed from one invoice line, before confidence is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRow {
    pub item_no: Option<String>,
    pub desc: String,
    pub qty: u32,
    pub price: Option<Decimal>,
}

/// Undo OCR artifacts that recur on supplier invoices and restrict the line
/// to the characters the row parser understands.
pub fn normalize_common_errors(line: &str) -> String {
    let s = re_misread_100pc().replace_all(line, "100pc");
    let s = re_leading_bracket().replace(&s, "$1");
    let s = re_disallowed().replace_all(&s, " ");
    collapse(&s)
}

fn collapse(s: &str) -> String {
    re_whitespace().replace_all(s, " ").trim().to_string()
}

/// Parse one OCR'd invoice line into item number, description, quantity
/// and price. Missing pieces default silently (no item number, no price,
/// quantity 1).
///
/// The item number and trailing price bound the description; the quantity
/// is searched across the whole line and its token cut from whatever part
/// of it lies inside the description.
pub fn line_to_row(line: &str) -> LineRow {
    let clean = normalize_common_errors(line);

    let (item_no, desc_start) = split_item_no(&clean);
    let (price, desc_end) = split_price(&clean, desc_start);
    let (qty, qty_span) = find_qty(&clean);

    let desc = match qty_span {
        Some(span) => cut_span(&clean, desc_start..desc_end, span),
        None => clean[desc_start..desc_end].to_string(),
    };
    LineRow { item_no, desc: collapse(&desc), qty, price }
}

/// Item number and the offset where the rest of the line begins.
fn split_item_no(text: &str) -> (Option<String>, usize) {
    match re_item_no().captures(text) {
        Some(c) => {
            let rest = c.get(0).map_or(0, |m| m.end());
            (c.get(1).map(|m| m.as_str().to_string()), rest)
        }
        None => (None, 0),
    }
}

/// Trailing price within `text[start..]` and the offset where it begins
/// (the line end when there is none).
fn split_price(text: &str, start: usize) -> (Option<Decimal>, usize) {
    let Some(m) = re_price().find(&text[start..]) else {
        return (None, text.len());
    };
    match parse_price(m.as_str()) {
        Some(price) => (Some(price), start + m.start()),
        None => (None, text.len()),
    }
}

fn parse_price(s: &str) -> Option<Decimal> {
    Decimal::from_str(&s.replace(',', "")).ok()
}

/// Quantity from `qty N` or `N x` anywhere in the line, with the span of the
/// matched token.
fn find_qty(text: &str) -> (u32, Option<Range<usize>>) {
    let caps = re_qty_label()
        .captures(text)
        .or_else(|| re_qty_times().captures(text));
    let Some(c) = caps else {
        return (1, None);
    };
    let (Some(whole), Some(digits)) = (c.get(0), c.get(1)) else {
        return (1, None);
    };
    let qty = digits.as_str().parse::<u32>().ok().filter(|q| *q >= 1).unwrap_or(1);
    (qty, Some(whole.range()))
}

/// `text[keep]` with the overlap of `cut` replaced by a space.
fn cut_span(text: &str, keep: Range<usize>, cut: Range<usize>) -> String {
    let cut_start = cut.start.clamp(keep.start, keep.end);
    let cut_end = cut.end.clamp(keep.start, keep.end);
    let mut out = String::with_capacity(keep.len() + 1);
    out.push_str(&text[keep.start..cut_start]);
    out.push(' ');
    out.push_str(&text[cut_end..keep.end]);
    out
}

/// Build one item per line. Lines without their own confidence inherit the
/// document average.
pub fn structure_items(lines: &[String], confidences: &[f32], avg_conf: f32) -> Vec<InvoiceLineItem> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let row = line_to_row(line);
            let conf = confidences.get(i).copied().unwrap_or(avg_conf);
            InvoiceLineItem::new(row.item_no, row.desc, row.qty, row.price, conf)
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

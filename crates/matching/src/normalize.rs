/// Canonical comparison form of an OCR string: lower-cased, everything but
/// `[a-z0-9]`, whitespace, `-` and `.` turned into spaces, whitespace runs
/// collapsed and trimmed.
///
/// Only used for scoring; labels keep their original text.
pub fn normalize(s: &str) -> String {
    let mapped: String = s
        .to_lowercase()
        .chars()
        .map(|c| if is_kept(c) { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_kept(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.' || c.is_whitespace()
}

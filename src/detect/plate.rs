//! Plate text normalization.
//!
//! OCR output is messy: mixed case, separators, partial reads. Recognized
//! text is normalized (uppercased, separators stripped) and validated
//! against a registration pattern before it enters an evidence record;
//! anything that fails the pattern is treated as a misread and dropped.

use regex::Regex;
use std::sync::OnceLock;

static PLATE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn plate_pattern() -> &'static Regex {
    // 4-10 alphanumerics after normalization covers the registration
    // formats the deployments care about without being region-specific.
    PLATE_PATTERN.get_or_init(|| Regex::new("^[A-Z0-9]{4,10}$").expect("static plate pattern"))
}

/// Normalize raw OCR text into a canonical plate number.
///
/// Returns `None` when the text does not look like a plate after cleanup.
pub fn normalize_plate(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if plate_pattern().is_match(&cleaned) {
        Some(cleaned)
    } else {
        None
    }
}

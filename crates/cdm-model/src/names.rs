//! Boundary normalization for table and field names.

/// Normalizes a header or field name read from an external source.
///
/// Strips byte-order markers and surrounding whitespace, and collapses runs
/// of inner whitespace to a single space. Applied to source CSV headers and
/// to every name in a rule configuration, so both sides compare equal.
pub fn normalize_name(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}').trim();
    let mut parts = trimmed.split_whitespace();
    let mut normalized = String::with_capacity(trimmed.len());
    if let Some(first) = parts.next() {
        normalized.push_str(first);
        for part in parts {
            normalized.push(' ');
            normalized.push_str(part);
        }
    }
    normalized
}

//! Candidate statement normalization.

/// Trims surrounding whitespace and removes at most one trailing `;`.
///
/// Internal content is never altered. Whitespace between the statement and
/// its terminator (`SELECT 1 ;`) is left in place, only the outer text is
/// trimmed.
pub fn normalize(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed)
}

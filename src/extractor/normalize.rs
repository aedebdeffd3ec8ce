use percent_encoding::percent_decode_str;

use crate::patterns::{is_denylisted, is_valid_address, strip_invisible};

/// Characters peeled off both ends of a candidate.
const SURROUNDING_PUNCTUATION: &[char] = &[
    '<', '>', '(', ')', '[', ']', '{', '}', '"', '\'', '`', ',', ';', ':', '.', '!', '?', '*',
    '|', '\\', '/',
];

/// Turn a decoded candidate into a stored address, or `None` when it fails
/// validation or is a known placeholder.
pub fn normalize_candidate(raw: &str) -> Option<String> {
    let trimmed = strip_mailto(raw.trim());
    let decoded = percent_decode_str(trimmed).decode_utf8_lossy();
    let visible = strip_invisible(&decoded);
    let address = visible
        .trim_matches(|c: char| c.is_whitespace() || SURROUNDING_PUNCTUATION.contains(&c))
        .to_lowercase();

    if !is_valid_address(&address) || is_denylisted(&address) {
        return None;
    }
    Some(address)
}

fn strip_mailto(value: &str) -> &str {
    match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("mailto:") => &value[7..],
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_wrapping_and_case() {
        for raw in [
            "Info@Firma.de",
            "  mailto:info@firma.de ",
            "MAILTO:info@firma.de",
            "<info@firma.de>",
            "(info@firma.de).",
            "info%40firma.de",
            "in\u{200B}fo@firma.de",
        ] {
            assert_eq!(normalize_candidate(raw).as_deref(), Some("info@firma.de"), "{raw}");
        }
    }

    #[test]
    fn rejects_invalid_and_placeholder() {
        assert_eq!(normalize_candidate("logo@2x.png"), None);
        assert_eq!(normalize_candidate("yourname@domain.com"), None);
        assert_eq!(normalize_candidate("info@example.com"), None);
        assert_eq!(normalize_candidate("mailto:"), None);
    }
}

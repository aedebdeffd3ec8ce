//! Addresses written out in full, in the markup or in the rendered text.

use std::collections::HashSet;

use crate::extractor::PageView;
use crate::extractor::model::{ObfuscationMatch, Technique};
use crate::fetcher::decode::visible_text;
use crate::patterns::{EMAIL_REGEX, INVISIBLE_CHARS, strip_invisible};

pub fn find(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    if page.html.is_empty() {
        let text = strip_invisible(&page.text);
        return EMAIL_REGEX
            .find_iter(&text)
            .map(|m| ObfuscationMatch::verbatim(m.as_str(), Technique::Plain))
            .collect();
    }
    // Browser text runs sibling elements together; the parsed document does not
    let mut text_hits = text_matches(&page.text);
    text_hits.extend(text_matches(&visible_text(&page.document)));
    markup_matches(page.html, &text_hits)
        .into_iter()
        .map(|hit| ObfuscationMatch::verbatim(hit, Technique::Plain))
        .collect()
}

/// Lowercased plain matches in rendered text, invisible characters removed.
pub(super) fn text_matches(text: &str) -> HashSet<String> {
    let text = strip_invisible(text);
    EMAIL_REGEX
        .find_iter(&text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Plain matches in markup. A match that starts right after a tag or an
/// entity, or touches an entity or an invisible character, may be part of an
/// address split across nodes, so it is kept only when the rendered text shows
/// the same address whole. Ending at a tag is fine on its own.
pub(super) fn markup_matches<'a>(markup: &'a str, text_hits: &HashSet<String>) -> Vec<&'a str> {
    let mut out = Vec::new();
    for m in EMAIL_REGEX.find_iter(markup) {
        let before = markup[..m.start()].chars().next_back();
        let after = markup[m.end()..].chars().next();

        let mut candidate = m.as_str();
        if before == Some('\\') {
            match trim_escape_prefix(candidate) {
                Some(rest) => candidate = rest,
                None => continue,
            }
        }

        let fragment = matches!(before, Some('>' | ';'))
            || after == Some('&')
            || before.is_some_and(|c| INVISIBLE_CHARS.contains(&c))
            || after.is_some_and(|c| INVISIBLE_CHARS.contains(&c));
        if fragment && !text_hits.contains(&candidate.to_lowercase()) {
            continue;
        }
        out.push(candidate);
    }
    out
}

/// `>info@firma.de` in serialized JSON matches as `u003einfo@firma.de`.
fn trim_escape_prefix(candidate: &str) -> Option<&str> {
    let bytes = candidate.as_bytes();
    let skip = match bytes.first()? {
        b'u' if bytes.len() > 5 && bytes[1..5].iter().all(u8::is_ascii_hexdigit) => 5,
        b'x' if bytes.len() > 3 && bytes[1..3].iter().all(u8::is_ascii_hexdigit) => 3,
        b'n' | b'r' | b't' => 1,
        _ => 0,
    };
    let rest = &candidate[skip..];
    if rest.starts_with('@') || rest.is_empty() {
        return None;
    }
    Some(rest)
}

//! Character references: `info&#64;firma&#46;de`, `info&commat;firma.de`.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::extractor::PageView;
use crate::extractor::model::{ObfuscationMatch, Technique};
use crate::extractor::plain::{markup_matches, text_matches};

static ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([a-zA-Z]{2,10}));").unwrap()
});

/// Named references that show up in hand-obfuscated addresses.
const NAMED_REFERENCES: &[(&str, &str)] = &[
    ("commat", "@"),
    ("period", "."),
    ("fullstop", "."),
    ("amp", "&"),
    ("nbsp", " "),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("hyphen", "-"),
    ("dash", "-"),
    ("lowbar", "_"),
    ("plus", "+"),
];

pub fn find(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    let decoded = decode_entities(page.html);
    let Cow::Owned(decoded) = decoded else {
        return Vec::new();
    };
    let text_hits = text_matches(&page.text);
    markup_matches(&decoded, &text_hits)
        .into_iter()
        .map(|hit| ObfuscationMatch::verbatim(hit, Technique::EntityEncoded))
        .collect()
}

/// Replace numeric and known named references. Unknown names and invalid
/// code points are left as written.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }
    ENTITY_REGEX.replace_all(input, |caps: &Captures<'_>| {
        let code_point = if let Some(dec) = caps.get(1) {
            dec.as_str().parse::<u32>().ok()
        } else if let Some(hex) = caps.get(2) {
            u32::from_str_radix(hex.as_str(), 16).ok()
        } else {
            None
        };
        if let Some(c) = code_point.and_then(char::from_u32) {
            return c.to_string();
        }
        if let Some(name) = caps.get(3) {
            let name = name.as_str();
            if let Some((_, value)) = NAMED_REFERENCES
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
            {
                return (*value).to_string();
            }
        }
        caps[0].to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_numeric_and_named_references() {
        assert_eq!(decode_entities("info&#64;example.com"), "info@example.com");
        assert_eq!(decode_entities("info&#x40;firma&#X2E;de"), "info@firma.de");
        assert_eq!(decode_entities("info&commat;firma&period;de"), "info@firma.de");
        assert_eq!(decode_entities("a &unknown; b &#xFFFFFF;"), "a &unknown; b &#xFFFFFF;");
        assert!(matches!(decode_entities("no refs"), Cow::Borrowed(_)));
    }

    #[test]
    fn entity_encoded_address_is_decoded() {
        let page = PageView::new("<p>Mail: info&#64;example.com</p>", "", &[]);
        let found = find(&page);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].decoded, "info@example.com");
        assert_eq!(found[0].technique, Technique::EntityEncoded);
    }

    #[test]
    fn fully_encoded_address_is_decoded() {
        let html = "<a href=\"&#109;&#97;&#105;&#108;&#116;&#111;&#58;&#105;&#110;&#102;&#111;&#64;&#102;&#105;&#114;&#109;&#97;&#46;&#100;&#101;\">x</a>";
        let page = PageView::new(html, "x", &[]);
        let found: Vec<_> = find(&page).into_iter().map(|m| m.decoded).collect();
        assert_eq!(found, vec!["info@firma.de"]);
    }
}

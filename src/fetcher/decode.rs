use crate::fetcher::types::Charset;
use crate::patterns::ends_with_address;
use crate::pipeline::target::same_site;
use encoding_rs::Encoding;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

static CHARSET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).unwrap());

static META_CHARSET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<meta\s+[^>]*?charset\s*=\s*["']?([^"'\s/>]+)"#).unwrap());

static META_HTTP_EQUIV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+[^>]*?http-equiv\s*=\s*["']?content-type["']?[^>]*?content\s*=\s*["']?[^"'>]*?charset\s*=\s*([^"'\s;/>]+)"#).unwrap()
});

static SCRIPT_SRC_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script[src]").unwrap());

/// Elements whose text never renders.
pub(crate) const INVISIBLE_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "head", "iframe", "object",
];

pub(crate) const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Nesting beyond this is not walked for visible text.
pub(crate) const MAX_TEXT_DEPTH: usize = 256;

/// Decode a response body: `Content-Type` charset first, then `<meta>` hints,
/// then `chardetng`. Undecodable bytes become U+FFFD rather than failing the page.
pub fn decode_body(content_type: &str, body_bytes: &[u8]) -> (String, Charset) {
    let encoding = detect_encoding(content_type, body_bytes);
    let (decoded, _encoding, had_errors) = encoding.decode(body_bytes);
    if had_errors {
        debug!(encoding = encoding.name(), "body contained malformed sequences");
    }
    (decoded.into_owned(), Charset::from_encoding(encoding))
}

fn detect_encoding(content_type: &str, body_bytes: &[u8]) -> &'static Encoding {
    // 1. Check Content-Type header for charset
    if let Some(encoding) = CHARSET_REGEX
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Encoding::for_label(m.as_str().to_lowercase().as_bytes()))
    {
        return encoding;
    }

    // 2. Check <meta charset> and <meta http-equiv> in first 4KB
    let search_bytes = &body_bytes[..body_bytes.len().min(4096)];
    let search_str = String::from_utf8_lossy(search_bytes);

    for regex in [&*META_CHARSET_REGEX, &*META_HTTP_EQUIV_REGEX] {
        if let Some(encoding) = regex
            .captures(&search_str)
            .and_then(|caps| caps.get(1))
            .and_then(|m| Encoding::for_label(m.as_str().to_lowercase().as_bytes()))
        {
            return encoding;
        }
    }

    // 3. Use chardet for heuristic detection
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(search_bytes, false);
    detector.guess(None, true)
}

/// Text a reader would see: script/style and similar subtrees skipped, block
/// elements separated by newlines, runs of whitespace collapsed.
pub fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    collect_text(document.root_element(), &mut out, 0);
    normalize_whitespace(&out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String, depth: usize) {
    if depth > MAX_TEXT_DEPTH {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if INVISIBLE_ELEMENTS.contains(&name) || el.attr("hidden").is_some() {
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                separate_address(out);
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out, depth + 1);
                }
                separate_address(out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Keep a complete address from running into the text of the next element
/// (`<span>info@firma.de</span><span>Telefon</span>`).
pub(crate) fn separate_address(out: &mut String) {
    if ends_with_address(out) {
        out.push(' ');
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Same-site `<script src>` URLs in document order, at most `limit`.
pub fn linked_script_urls(document: &Html, base: &Url, limit: usize) -> Vec<Url> {
    let mut urls: Vec<Url> = Vec::new();
    for script in document.select(&SCRIPT_SRC_SELECTOR) {
        if urls.len() >= limit {
            break;
        }
        let Some(src) = script.value().attr("src") else {
            continue;
        };
        let Ok(url) = base.join(src.trim()) else {
            continue;
        };
        if matches!(url.scheme(), "http" | "https") && same_site(&url, base) && !urls.contains(&url)
        {
            urls.push(url);
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_charset_from_content_type() {
        let body = b"<html><head><title>Test</title></head></html>";
        let (_, charset) = decode_body("text/html; charset=utf-8", body);
        assert_eq!(charset, Charset::Utf8);
    }

    #[test]
    fn test_detect_charset_from_meta_tag() {
        let body = b"<html><head><meta charset=\"iso-8859-1\"><title>Caf\xe9</title></head></html>";
        let (html, charset) = decode_body("text/html", body);
        // ISO-8859-1 gets mapped to Windows1252 by encoding_rs since it's a superset
        assert_eq!(charset, Charset::Windows1252);
        assert!(html.contains("Café"));
    }

    #[test]
    fn test_detect_charset_from_meta_http_equiv() {
        let body = b"<html><head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=windows-1252\"><title>Test</title></head></html>";
        let (_, charset) = decode_body("text/html", body);
        assert_eq!(charset, Charset::Windows1252);
    }

    #[test]
    fn test_decode_utf8() {
        let (decoded, _) = decode_body("text/html; charset=utf-8", "Hello, 世界!".as_bytes());
        assert_eq!(decoded, "Hello, 世界!");
    }

    #[test]
    fn visible_text_skips_scripts_and_separates_blocks() {
        let html = Html::parse_document(
            r#"<html><head><title>T</title><style>p{}</style></head>
            <body><p>Write to <b>info@firma.de</b></p><script>var x = "a@b.de";</script>
            <div hidden>decoy@firma.de</div><p>Thanks</p></body></html>"#,
        );
        let text = visible_text(&html);
        assert_eq!(text, "Write to info@firma.de\nThanks");
    }

    #[test]
    fn visible_text_keeps_sibling_address_apart() {
        let html = Html::parse_document(
            "<div><span>E-Mail: info@firma.de</span><span>Telefon: 0421 123</span></div>",
        );
        assert_eq!(visible_text(&html), "E-Mail: info@firma.de Telefon: 0421 123");

        let html = Html::parse_document("<p>in<span>fo@</span><b>firma</b>.de</p>");
        assert_eq!(visible_text(&html), "info@firma.de");
    }

    #[test]
    fn linked_scripts_are_same_site_and_capped() {
        let html = Html::parse_document(
            r#"<script src="/js/app.js"></script>
            <script src="https://cdn.other.net/lib.js"></script>
            <script src="https://www.firma.de/js/contact.js"></script>
            <script src="/js/extra.js"></script>"#,
        );
        let base = Url::parse("https://firma.de/").unwrap();
        let urls = linked_script_urls(&html, &base, 2);
        assert_eq!(
            urls.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec!["https://firma.de/js/app.js", "https://www.firma.de/js/contact.js"]
        );
    }
}

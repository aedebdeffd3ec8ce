//! Addresses carried by attributes: `mailto:` links, image alt/title text and
//! Cloudflare's email protection.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use scraper::Selector;

use crate::extractor::PageView;
use crate::extractor::model::{ObfuscationMatch, Technique};
use crate::extractor::words;
use crate::patterns::EMAIL_REGEX;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], area[href]").unwrap());

static IMAGE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[alt], img[title]").unwrap());

static CF_EMAIL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-cfemail]").unwrap());

const CF_PROTECTION_PATH: &str = "/cdn-cgi/l/email-protection#";

pub fn find(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    let mut out = mailto_targets(page);
    out.extend(image_text(page));
    out.extend(cloudflare(page));
    out
}

fn mailto_targets(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    let mut out = Vec::new();
    for link in page.document.select(&LINK_SELECTOR) {
        let Some(href) = link.value().attr("href").map(str::trim) else {
            continue;
        };
        let Some(scheme) = href.get(..7) else {
            continue;
        };
        if !scheme.eq_ignore_ascii_case("mailto:") {
            continue;
        }
        let recipients = href[7..].split('?').next().unwrap_or_default();
        let recipients = percent_decode_str(recipients).decode_utf8_lossy();
        for recipient in recipients.split([',', ';']) {
            let recipient = recipient.trim();
            if !recipient.is_empty() {
                out.push(ObfuscationMatch::new(href, Technique::MailtoHref, recipient));
            }
        }
    }
    out
}

fn image_text(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    let mut out = Vec::new();
    for image in page.document.select(&IMAGE_SELECTOR) {
        for name in ["alt", "title"] {
            let Some(text) = image.value().attr(name) else {
                continue;
            };
            out.extend(
                EMAIL_REGEX
                    .find_iter(text)
                    .map(|m| ObfuscationMatch::verbatim(m.as_str(), Technique::ImageAltText)),
            );
            out.extend(words::find_in(text, Technique::ImageAltText));
        }
    }
    out
}

fn cloudflare(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    let mut out = Vec::new();
    for element in page.document.select(&CF_EMAIL_SELECTOR) {
        if let Some(encoded) = element.value().attr("data-cfemail")
            && let Some(decoded) = decode_cfemail(encoded)
        {
            out.push(ObfuscationMatch::new(encoded, Technique::CfEmail, decoded));
        }
    }
    for link in page.document.select(&LINK_SELECTOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if let Some((_, encoded)) = href.split_once(CF_PROTECTION_PATH)
            && let Some(decoded) = decode_cfemail(encoded)
        {
            out.push(ObfuscationMatch::new(href, Technique::CfEmail, decoded));
        }
    }
    out
}

/// Hex pairs where the first byte is the XOR key for the rest.
pub fn decode_cfemail(encoded: &str) -> Option<String> {
    let encoded = encoded.trim();
    if encoded.len() < 4 || encoded.len() % 2 != 0 || !encoded.is_ascii() {
        return None;
    }
    let bytes: Vec<u8> = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&encoded[i..i + 2], 16))
        .collect::<Result<_, _>>()
        .ok()?;
    let key = bytes[0];
    String::from_utf8(bytes[1..].iter().map(|b| b ^ key).collect()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_cfemail(address: &str, key: u8) -> String {
        let mut out = format!("{key:02x}");
        for b in address.bytes() {
            out.push_str(&format!("{:02x}", b ^ key));
        }
        out
    }

    fn decoded(html: &str) -> Vec<(Technique, String)> {
        let page = PageView::new(html, "", &[]);
        find(&page).into_iter().map(|m| (m.technique, m.decoded)).collect()
    }

    #[test]
    fn mailto_is_decoded_and_split() {
        let html = r#"<a href="MAILTO:info%40firma.de,%20sales@firma.de?subject=Hallo">Mail</a>"#;
        assert_eq!(
            decoded(html),
            vec![
                (Technique::MailtoHref, "info@firma.de".to_string()),
                (Technique::MailtoHref, "sales@firma.de".to_string()),
            ]
        );
    }

    #[test]
    fn image_alt_text_is_read() {
        let html = r#"<img src="mail.png" alt="info [at] firma [dot] de"><img title="jobs@firma.de">"#;
        let found = decoded(html);
        assert!(found.contains(&(Technique::ImageAltText, "info@firma.de".to_string())));
        assert!(found.contains(&(Technique::ImageAltText, "jobs@firma.de".to_string())));
    }

    #[test]
    fn cloudflare_protection_is_decoded() {
        let encoded = encode_cfemail("info@firma.de", 0x5a);
        assert_eq!(decode_cfemail(&encoded).as_deref(), Some("info@firma.de"));

        let html = format!(
            r#"<a href="/cdn-cgi/l/email-protection#{encoded}"><span class="__cf_email__" data-cfemail="{encoded}">[email&#160;protected]</span></a>"#
        );
        let found = decoded(&html);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|(t, a)| *t == Technique::CfEmail && a == "info@firma.de"));
    }

    #[test]
    fn malformed_cloudflare_payloads_are_ignored() {
        assert_eq!(decode_cfemail("5"), None);
        assert_eq!(decode_cfemail("zz00"), None);
        assert_eq!(decode_cfemail("abc"), None);
    }
}

//! Extraction engine: every technique scans the whole page, in precedence
//! order, and the first technique to yield an address owns its provenance.

pub mod attributes;
pub mod entities;
pub mod model;
pub mod normalize;
pub mod plain;
pub mod script;
pub mod split;
pub mod words;

#[cfg(test)]
mod tests;

use std::borrow::Cow;

use scraper::Html;
use tracing::debug;

pub use model::{EmailRecord, EmailSet, ObfuscationMatch, Technique};
pub use normalize::normalize_candidate;

use crate::fetcher::decode::visible_text;
use crate::fetcher::types::PageFetchResult;

/// One parsed page shared by all techniques.
pub struct PageView<'a> {
    pub html: &'a str,
    pub text: Cow<'a, str>,
    pub document: Html,
    /// Linked script bodies fetched alongside the page.
    pub scripts: &'a [String],
}

impl<'a> PageView<'a> {
    /// Parses `html` once. Empty `text` is derived from the document.
    pub fn new(html: &'a str, text: &'a str, scripts: &'a [String]) -> Self {
        let document = Html::parse_document(html);
        let text = if text.is_empty() && !html.is_empty() {
            Cow::Owned(visible_text(&document))
        } else {
            Cow::Borrowed(text)
        };
        Self {
            html,
            text,
            document,
            scripts,
        }
    }
}

/// All raw candidates on the page, in precedence order.
pub fn scan(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    let mut matches = plain::find(page);
    matches.extend(entities::find(page));
    matches.extend(words::find(page));
    matches.extend(split::find(page));
    matches.extend(script::find(page));
    matches.extend(attributes::find(page));
    matches
}

/// Validated, deduplicated addresses on `page`, attributed to its final URL.
/// Failed fetches that still carried a body are scanned like any other page.
pub fn extract(page: &PageFetchResult) -> EmailSet {
    let mut emails = EmailSet::new();
    if page.html.is_empty() && page.text.is_empty() && page.scripts.is_empty() {
        return emails;
    }

    let view = PageView::new(&page.html, &page.text, &page.scripts);
    let matches = scan(&view);
    let candidates = matches.len();
    for m in matches {
        let Some(address) = normalize_candidate(&m.decoded) else {
            continue;
        };
        emails.insert(EmailRecord {
            address,
            source_url: page.final_url.clone(),
            technique: m.technique,
        });
    }

    debug!(
        url = %page.final_url,
        tier = %page.tier,
        candidates,
        emails = emails.len(),
        "page extracted"
    );
    emails
}

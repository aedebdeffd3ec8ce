//! Anchor collection, normalization and exclusion.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::fetcher::decode::normalize_whitespace;
use crate::patterns::{DOWNLOAD_EXTENSIONS, is_social_host, is_tracking_param};
use crate::pipeline::target::{same_site, site_host};

static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const EXCLUDED_PREFIXES: &[&str] = &["mailto:", "tel:", "javascript:", "sms:", "data:", "callto:"];

const PROMINENT_TAGS: &[&str] = &["header", "nav", "footer"];
const PROMINENT_ROLES: &[&str] = &["navigation", "contentinfo", "banner", "menubar"];
const PROMINENT_HINTS: &[&str] = &["footer", "nav", "menu", "header"];

/// An anchor that survived exclusion, before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLink {
    pub url: Url,
    /// Lowercased, whitespace-collapsed anchor text (falls back to title/aria-label/img alt).
    pub anchor_text: String,
    /// Inside a header, nav or footer region.
    pub prominent: bool,
}

/// Collect same-site anchors from `html`, resolved against `base`. Anchors
/// pointing at any of `exclude` (the homepage) are dropped.
pub fn collect_links(html: &str, base: &Url, sites: &[&Url], exclude: &[&Url]) -> Vec<RawLink> {
    let document = Html::parse_document(html);
    let excluded: Vec<String> = exclude.iter().filter_map(|u| page_key(u)).collect();

    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            let url = normalize_href(href, base)?;
            if !sites.iter().any(|site| same_site(&url, site)) {
                return None;
            }
            if page_key(&url).is_some_and(|key| excluded.contains(&key)) {
                return None;
            }
            Some(RawLink {
                url,
                anchor_text: anchor_text(anchor),
                prominent: is_prominent(anchor),
            })
        })
        .collect()
}

/// Resolve and clean an href. `None` when the link is never a candidate:
/// non-web schemes, social networks, file downloads.
pub fn normalize_href(href: &str, base: &Url) -> Option<Url> {
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if EXCLUDED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if is_social_host(url.host_str()?) || is_download(&url) {
        return None;
    }

    url.set_fragment(None);
    strip_tracking_params(&mut url);
    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }
    Some(url)
}

fn strip_tracking_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}

fn is_download(url: &Url) -> bool {
    let Some(last) = url.path_segments().and_then(|mut segments| segments.next_back()) else {
        return false;
    };
    match last.rsplit_once('.') {
        Some((_, ext)) => DOWNLOAD_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Identity of a page for "is this the homepage" checks: site host, path
/// without trailing slash, query.
fn page_key(url: &Url) -> Option<String> {
    let host = site_host(url)?;
    let path = url.path().trim_end_matches('/');
    Some(match url.query() {
        Some(q) => format!("{host}{path}?{q}"),
        None => format!("{host}{path}"),
    })
}

fn anchor_text(anchor: ElementRef<'_>) -> String {
    let text = normalize_whitespace(&anchor.text().collect::<Vec<_>>().join(" "));
    if !text.is_empty() {
        return text.to_lowercase();
    }
    let attr = ["title", "aria-label"]
        .iter()
        .find_map(|name| anchor.value().attr(name).filter(|v| !v.trim().is_empty()))
        .or_else(|| {
            anchor
                .descendants()
                .filter_map(ElementRef::wrap)
                .find_map(|el| el.value().attr("alt").filter(|v| !v.trim().is_empty()))
        })
        .unwrap_or_default();
    normalize_whitespace(attr).to_lowercase()
}

fn is_prominent(anchor: ElementRef<'_>) -> bool {
    anchor.ancestors().filter_map(ElementRef::wrap).any(|el| {
        let value = el.value();
        if PROMINENT_TAGS.contains(&value.name()) {
            return true;
        }
        if value
            .attr("role")
            .is_some_and(|role| PROMINENT_ROLES.contains(&role.to_ascii_lowercase().as_str()))
        {
            return true;
        }
        let class_and_id = format!(
            "{} {}",
            value.attr("class").unwrap_or_default(),
            value.attr("id").unwrap_or_default()
        )
        .to_ascii_lowercase();
        PROMINENT_HINTS.iter().any(|hint| class_and_id.contains(hint))
    })
}

/// Decoded, lowercased, non-empty path segments.
pub fn path_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| percent_decode_str(s).decode_utf8_lossy().to_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

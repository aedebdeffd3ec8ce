//! When an HTTP-tier result should be retried in the browser.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::fetcher::errors::ErrorKind;
use crate::fetcher::types::PageFetchResult;
use crate::patterns::find_spa_marker;

/// Visible text shorter than this counts as a near-empty body.
pub const NEAR_EMPTY_TEXT_CHARS: usize = 200;

/// Share of the HTML taken up by inline script code that marks a page as script heavy.
const SCRIPT_SHARE_THRESHOLD: f64 = 0.6;
const MANY_SCRIPTS: usize = 8;
const SPARSE_TEXT_CHARS: usize = 1000;

static SCRIPT_BLOCK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").unwrap());

/// Signs that the content is produced client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderSignal {
    NearEmptyBody,
    ScriptHeavy,
    FrameworkMarker(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationReason {
    HttpFailed(ErrorKind),
    BotChallenge,
    ClientRendered(RenderSignal),
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpFailed(kind) => write!(f, "http failed ({kind})"),
            Self::BotChallenge => f.write_str("bot challenge"),
            Self::ClientRendered(RenderSignal::NearEmptyBody) => f.write_str("near-empty body"),
            Self::ClientRendered(RenderSignal::ScriptHeavy) => f.write_str("script-heavy page"),
            Self::ClientRendered(RenderSignal::FrameworkMarker(marker)) => {
                write!(f, "framework marker {marker}")
            }
        }
    }
}

/// Decide whether `result` (from the HTTP tier) must be fetched again in the
/// browser. `emails_found` is what extraction got out of it.
///
/// Failures escalate, except unsupported content which no browser will fix.
/// Successful pages escalate only when nothing was found and the page looks
/// client rendered.
pub fn escalation_reason(
    result: &PageFetchResult,
    emails_found: usize,
) -> Option<EscalationReason> {
    match result.error_kind() {
        Some(ErrorKind::UnsupportedContent) => None,
        Some(ErrorKind::BotChallengeDetected) => Some(EscalationReason::BotChallenge),
        Some(kind) => Some(EscalationReason::HttpFailed(kind)),
        None if emails_found > 0 => None,
        None => render_signal(result).map(EscalationReason::ClientRendered),
    }
}

pub fn render_signal(result: &PageFetchResult) -> Option<RenderSignal> {
    if let Some(marker) = find_spa_marker(&result.html) {
        return Some(RenderSignal::FrameworkMarker(marker));
    }

    let text_chars = result.text.trim().chars().count();
    if text_chars < NEAR_EMPTY_TEXT_CHARS {
        return Some(RenderSignal::NearEmptyBody);
    }

    let mut script_count = 0;
    let mut script_bytes = 0;
    for caps in SCRIPT_BLOCK_REGEX.captures_iter(&result.html) {
        script_count += 1;
        script_bytes += caps.get(1).map_or(0, |m| m.as_str().len());
    }
    let share = script_bytes as f64 / result.html.len().max(1) as f64;
    if share > SCRIPT_SHARE_THRESHOLD
        || (script_count >= MANY_SCRIPTS && text_chars < SPARSE_TEXT_CHARS)
    {
        return Some(RenderSignal::ScriptHeavy);
    }

    None
}

//! One page, HTTP first, browser when the escalation policy asks for it.

use tracing::debug;
use url::Url;

use crate::extractor::{EmailSet, extract};
use crate::fetcher::errors::ErrorKind;
use crate::fetcher::escalation::escalation_reason;
use crate::fetcher::session::TargetSession;
use crate::fetcher::strategy::FetchStrategy;
use crate::fetcher::types::{FetchTier, PageFetchResult};
use crate::pipeline::report::PageSummary;

#[derive(Debug, Clone)]
pub struct PageVisit {
    /// The result later stages should read: the browser's when it succeeded,
    /// otherwise the HTTP tier's.
    pub page: PageFetchResult,
    pub emails: EmailSet,
    /// Set when neither tier produced a usable page.
    pub failure: Option<ErrorKind>,
    pub attempts: Vec<PageSummary>,
}

pub async fn visit(strategy: &FetchStrategy, url: &Url, session: &TargetSession) -> PageVisit {
    let http = strategy.fetch(url, FetchTier::Http, session).await;
    let mut emails = extract(&http);
    let mut attempts = vec![PageSummary::new(&http, emails.len())];

    let Some(reason) = escalation_reason(&http, emails.len()) else {
        let failure = http.error_kind();
        return PageVisit {
            page: http,
            emails,
            failure,
            attempts,
        };
    };

    debug!(url = %url, reason = %reason, "escalating to browser");
    let browser = strategy.fetch(url, FetchTier::Browser, session).await;
    let browser_emails = extract(&browser);
    attempts.push(PageSummary::new(&browser, browser_emails.len()));
    emails.merge(browser_emails);

    let failure = match (http.error_kind(), browser.error_kind()) {
        (_, None) | (None, _) => None,
        (Some(ErrorKind::BotChallengeDetected), Some(browser_kind)) => Some(browser_kind),
        (Some(http_kind), Some(_)) => Some(http_kind),
    };
    let page = if browser.is_success() || !http.is_success() {
        browser
    } else {
        http
    };

    PageVisit {
        page,
        emails,
        failure,
        attempts,
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use url::Url;

use crate::config::Config;
use crate::fetcher::browser::BrowserFetcher;
use crate::fetcher::client::HttpFetcher;
use crate::fetcher::errors::FetchError;
use crate::fetcher::rate_limit::HostRateLimiter;
use crate::fetcher::session::TargetSession;
use crate::fetcher::types::{FetchTier, PageFetchResult};

/// One fetch tier. Implementations never fail outright: errors are reported
/// inside the returned [`PageFetchResult`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn tier(&self) -> FetchTier;

    async fn fetch(&self, url: &Url, session: &TargetSession) -> PageFetchResult;
}

/// Both tiers behind hard deadlines. The caller picks the tier; the
/// escalation policy lives with the orchestrator.
#[derive(Clone)]
pub struct FetchStrategy {
    http: Arc<dyn PageFetcher>,
    browser: Arc<dyn PageFetcher>,
    http_deadline: Duration,
    browser_deadline: Duration,
}

impl FetchStrategy {
    pub fn new(
        http: Arc<dyn PageFetcher>,
        browser: Arc<dyn PageFetcher>,
        http_deadline: Duration,
        browser_deadline: Duration,
    ) -> Self {
        Self {
            http,
            browser,
            http_deadline,
            browser_deadline,
        }
    }

    /// Real HTTP and Chromium tiers sharing one process-wide host limiter.
    pub fn from_config(config: &Config, limiter: HostRateLimiter) -> Self {
        let http = HttpFetcher::new(config.http.clone(), config.retry.clone(), limiter);
        let browser = BrowserFetcher::new(config.browser.clone(), &config.http.user_agents);
        Self::new(
            Arc::new(http),
            Arc::new(browser),
            config.http.tier_deadline,
            config.browser.timeout,
        )
    }

    pub async fn fetch(
        &self,
        url: &Url,
        tier: FetchTier,
        session: &TargetSession,
    ) -> PageFetchResult {
        let (fetcher, deadline) = match tier {
            FetchTier::Http => (&self.http, self.http_deadline),
            FetchTier::Browser => (&self.browser, self.browser_deadline),
        };

        match tokio::time::timeout(deadline, fetcher.fetch(url, session)).await {
            Ok(result) => result,
            Err(_) => {
                let tier = fetcher.tier();
                warn!(url = %url, tier = %tier, "fetch deadline exceeded");
                PageFetchResult::failure(url.clone(), tier, &FetchError::Deadline(deadline))
            }
        }
    }
}

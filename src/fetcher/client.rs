use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER, USER_AGENT};
use scraper::Html;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{HttpConfig, RetryConfig};
use crate::fetcher::backoff::calculate_backoff_delay;
use crate::fetcher::decode::{decode_body, linked_script_urls, visible_text};
use crate::fetcher::errors::FetchError;
use crate::fetcher::rate_limit::HostRateLimiter;
use crate::fetcher::session::TargetSession;
use crate::fetcher::strategy::PageFetcher;
use crate::fetcher::types::{FetchTier, PageFetchResult};
use crate::patterns::find_challenge_marker;

/// Pages with less visible text than this and a challenge marker are treated
/// as interstitials even when served with 200.
const CHALLENGE_TEXT_LIMIT: usize = 600;

/// Lightweight tier: plain GET with browser-like headers, retries and
/// backoff. Never runs scripts.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    http: HttpConfig,
    retry: RetryConfig,
    limiter: HostRateLimiter,
}

impl HttpFetcher {
    pub fn new(http: HttpConfig, retry: RetryConfig, limiter: HostRateLimiter) -> Self {
        Self {
            http,
            retry,
            limiter,
        }
    }

    /// Fetch with retries. Always yields a result; failures are carried in it.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &Url, session: &TargetSession) -> PageFetchResult {
        let host = url.host_str().unwrap_or_default().to_string();
        let mut attempt: u32 = 0;
        let mut rate_limit_retried = false;

        loop {
            self.limiter.acquire(&host).await;

            let err = match self.fetch_once(url, session).await {
                Ok(result) => return result,
                Err(err) => err,
            };

            let retry_in = match &err {
                FetchError::RateLimited { retry_after } if !rate_limit_retried => {
                    rate_limit_retried = true;
                    let wait = retry_after
                        .unwrap_or_else(|| calculate_backoff_delay(attempt, &self.retry));
                    Some(wait.min(self.retry.max_retry_after))
                }
                FetchError::RateLimited { .. } => None,
                e if e.should_retry() && attempt + 1 < self.retry.max_attempts => {
                    attempt += 1;
                    Some(calculate_backoff_delay(attempt - 1, &self.retry))
                }
                _ => None,
            };

            match retry_in {
                Some(delay) => {
                    debug!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(error = %err, kind = %err.kind(), "http fetch failed");
                    return PageFetchResult::failure(url.clone(), FetchTier::Http, &err);
                }
            }
        }
    }

    /// One attempt. `Ok` is final (it may still hold a non-retryable failure
    /// such as a challenge page); `Err` is a failure the caller may retry.
    async fn fetch_once(
        &self,
        url: &Url,
        session: &TargetSession,
    ) -> Result<PageFetchResult, FetchError> {
        let attempt = async {
            let response = session
                .client()
                .get(url.clone())
                .header(USER_AGENT, self.pick_user_agent())
                .send()
                .await
                .map_err(FetchError::from_reqwest_error)?;

            let final_url = response.url().clone();
            let status = response.status();
            let headers = response.headers().clone();
            let body_bytes = read_capped(response, self.http.max_body_bytes).await?;

            Ok::<_, FetchError>((final_url, status, headers, body_bytes))
        };

        let (final_url, status, headers, body_bytes) =
            tokio::time::timeout(self.http.request_timeout, attempt)
                .await
                .map_err(|_| FetchError::RequestTimeout)??;

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        if !status.is_success() {
            return self.classify_error_status(
                url,
                final_url,
                status,
                &headers,
                &content_type,
                &body_bytes,
            );
        }

        // Only HTML is worth scanning
        if !is_html(&content_type) {
            return Ok(PageFetchResult::failure(
                url.clone(),
                FetchTier::Http,
                &FetchError::UnsupportedContentType(content_type),
            ));
        }

        let (html, charset) = decode_body(&content_type, &body_bytes);
        let (text, script_urls) = {
            let document = Html::parse_document(&html);
            (
                visible_text(&document),
                linked_script_urls(&document, &final_url, self.http.linked_scripts_max),
            )
        };

        if text.chars().count() < CHALLENGE_TEXT_LIMIT
            && let Some(marker) = find_challenge_marker(&html)
        {
            let err = FetchError::BotChallenge {
                status: Some(status.as_u16()),
                marker,
            };
            return Ok(PageFetchResult::failure(url.clone(), FetchTier::Http, &err)
                .with_body(final_url, html, text));
        }

        let scripts = self.fetch_scripts(session, script_urls).await;
        debug!(
            status = status.as_u16(),
            bytes = body_bytes.len(),
            scripts = scripts.len(),
            "page fetched"
        );

        Ok(PageFetchResult::success(
            url.clone(),
            final_url,
            FetchTier::Http,
            Some(status.as_u16()),
            html,
            text,
        )
        .with_scripts(scripts)
        .with_charset(charset))
    }

    fn classify_error_status(
        &self,
        url: &Url,
        final_url: Url,
        status: StatusCode,
        headers: &HeaderMap,
        content_type: &str,
        body_bytes: &[u8],
    ) -> Result<PageFetchResult, FetchError> {
        if matches!(status.as_u16(), 403 | 429 | 503) && is_html(content_type) {
            let (html, _) = decode_body(content_type, body_bytes);
            if let Some(marker) = find_challenge_marker(&html) {
                let err = FetchError::BotChallenge {
                    status: Some(status.as_u16()),
                    marker,
                };
                let text = visible_text(&Html::parse_document(&html));
                return Ok(PageFetchResult::failure(url.clone(), FetchTier::Http, &err)
                    .with_body(final_url, html, text));
            }
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                retry_after: headers
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| parse_retry_after(v, Utc::now())),
            });
        }

        Err(FetchError::Http {
            status,
            retriable: status.is_server_error(),
        })
    }

    /// Linked scripts are best effort: failures are logged and skipped. Each
    /// request takes its own slot from the host limiter.
    async fn fetch_scripts(&self, session: &TargetSession, urls: Vec<Url>) -> Vec<String> {
        let mut scripts = Vec::with_capacity(urls.len());
        for script_url in urls {
            self.limiter
                .acquire(script_url.host_str().unwrap_or_default())
                .await;

            let body = async {
                let response = session
                    .client()
                    .get(script_url.clone())
                    .header(USER_AGENT, self.pick_user_agent())
                    .send()
                    .await
                    .map_err(FetchError::from_reqwest_error)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Http {
                        status,
                        retriable: false,
                    });
                }
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|ct| ct.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let bytes = read_capped(response, self.http.max_body_bytes).await?;
                Ok(decode_body(&content_type, &bytes).0)
            };
            match tokio::time::timeout(self.http.request_timeout, body).await {
                Ok(Ok(text)) => scripts.push(text),
                Ok(Err(e)) => debug!(url = %script_url, error = %e, "linked script skipped"),
                Err(_) => debug!(url = %script_url, "linked script timed out"),
            }
        }
        scripts
    }

    fn pick_user_agent(&self) -> String {
        self.http
            .user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    fn tier(&self) -> FetchTier {
        FetchTier::Http
    }

    async fn fetch(&self, url: &Url, session: &TargetSession) -> PageFetchResult {
        HttpFetcher::fetch(self, url, session).await
    }
}

/// Read a body chunk by chunk, giving up as soon as it passes `limit` bytes.
async fn read_capped(mut response: reqwest::Response, limit: u64) -> Result<Vec<u8>, FetchError> {
    if let Some(content_length) = response.content_length()
        && content_length > limit
    {
        return Err(FetchError::BodyTooLarge(content_length));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(FetchError::from_reqwest_error)?
    {
        if (body.len() + chunk.len()) as u64 > limit {
            return Err(FetchError::BodyTooLarge((body.len() + chunk.len()) as u64));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn is_html(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/html") || content_type.contains("application/xhtml")
}

/// `Retry-After` as delta-seconds or an HTTP-date relative to `now`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((when - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn retry_after_accepts_seconds_and_dates() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        assert_eq!(parse_retry_after("7", now), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:05 GMT", now),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:27:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn html_content_types() {
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("application/pdf"));
    }
}

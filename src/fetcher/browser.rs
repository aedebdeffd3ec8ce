//! Scripted-browser tier backed by a shared headless Chromium.
//!
//! The browser process is launched lazily on first use and shared by every
//! Target. A failed launch is retried on the next fetch, and a browser whose
//! connection has closed is replaced. Each fetch gets its own browser context (separate cookies and
//! storage) and page; both are released by [`PageGuard`] whether the fetch
//! finishes, fails or is dropped by a deadline.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetUserAgentOverrideParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use futures::StreamExt;
use reqwest::cookie::CookieStore;
use scraper::Html;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use crate::config::BrowserConfig;
use crate::fetcher::decode::visible_text;
use crate::fetcher::errors::FetchError;
use crate::fetcher::session::TargetSession;
use crate::fetcher::strategy::PageFetcher;
use crate::fetcher::types::{FetchTier, PageFetchResult};
use crate::patterns::find_challenge_marker;

pub const ENV_CHROMIUM_PATH: &str = "MAILSCOUT_CHROMIUM_PATH";

const CHROMIUM_BINARIES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Rendered pages with less text than this and a challenge marker are interstitials.
const CHALLENGE_TEXT_LIMIT: usize = 600;

const FINGERPRINT_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => __LANGUAGES__ });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 8 });
window.chrome = window.chrome || { runtime: {} };
"#;

const CONSENT_SCRIPT: &str = r#"
(() => {
  const keywords = __KEYWORDS__;
  const known = [
    '#onetrust-accept-btn-handler',
    '#CybotCookiebotDialogBodyLevelButtonLevelOptinAllowAll',
    '#CybotCookiebotDialogBodyButtonAccept',
    '.cc-allow',
    '.cmplz-accept',
    '[data-testid="uc-accept-all-button"]',
    '#didomi-notice-agree-button',
  ];
  for (const sel of known) {
    const el = document.querySelector(sel);
    if (el && el.offsetParent !== null) { el.click(); return true; }
  }
  const nodes = document.querySelectorAll(
    'button, a, [role="button"], input[type="button"], input[type="submit"]');
  for (const el of nodes) {
    const label = ((el.innerText || el.value || '') + '').trim().toLowerCase();
    if (!label || label.length > 40 || el.offsetParent === null) continue;
    const hit = keywords.some(k => label === k || (k.length > 3 && label.includes(k)));
    if (hit) { el.click(); return true; }
  }
  return false;
})()
"#;

const DOM_SIZE_SCRIPT: &str =
    "document.body ? document.body.innerHTML.length + document.body.childElementCount : 0";

/// Look up the Chromium executable: explicit path first, then `PATH`.
pub fn find_chromium(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit
        && path.exists()
    {
        return Some(path.clone());
    }
    CHROMIUM_BINARIES
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// A launched Chromium and the task draining its CDP event stream.
struct Chromium {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl Chromium {
    /// The handler task ends when the connection to the browser closes.
    fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }
}

impl Drop for Chromium {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Holds at most one launched instance. Launch errors are returned to the
/// caller but never stored, so the next call launches again.
struct LaunchSlot<T> {
    current: Mutex<Option<Arc<T>>>,
}

impl<T> LaunchSlot<T> {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Return the cached instance if `alive` accepts it, else launch a new one.
    /// Concurrent callers wait on the same launch.
    async fn get_or_launch<A, F, Fut>(&self, alive: A, launch: F) -> Result<Arc<T>, String>
    where
        A: Fn(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let mut current = self.current.lock().await;
        if let Some(instance) = current.as_ref() {
            if alive(instance) {
                return Ok(Arc::clone(instance));
            }
            debug!("cached instance is gone, relaunching");
        }
        *current = None;
        let instance = Arc::new(launch().await?);
        *current = Some(Arc::clone(&instance));
        Ok(instance)
    }

    /// Forget `stale` unless another caller already replaced it.
    async fn discard(&self, stale: &Arc<T>) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, stale)) {
            *current = None;
        }
    }
}

/// Scripted-browser tier.
pub struct BrowserFetcher {
    config: BrowserConfig,
    user_agent: Option<String>,
    browser: LaunchSlot<Chromium>,
}

impl BrowserFetcher {
    pub fn new(config: BrowserConfig, user_agents: &[String]) -> Self {
        // Chromium should present a Chromium user agent
        let user_agent = user_agents
            .iter()
            .find(|ua| ua.contains("Chrome/"))
            .or_else(|| user_agents.first())
            .cloned();
        Self {
            config,
            user_agent,
            browser: LaunchSlot::new(),
        }
    }

    async fn browser(&self) -> Result<Arc<Chromium>, FetchError> {
        self.browser
            .get_or_launch(Chromium::is_alive, || launch(&self.config))
            .await
            .map_err(FetchError::BrowserUnavailable)
    }

    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &Url, session: &TargetSession) -> PageFetchResult {
        if !self.config.enabled {
            let err = FetchError::BrowserUnavailable("browser tier disabled".to_string());
            return PageFetchResult::failure(url.clone(), FetchTier::Browser, &err);
        }

        match self.render(url, session).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, kind = %err.kind(), "browser fetch failed");
                PageFetchResult::failure(url.clone(), FetchTier::Browser, &err)
            }
        }
    }

    async fn render(
        &self,
        url: &Url,
        session: &TargetSession,
    ) -> Result<PageFetchResult, FetchError> {
        let chromium = self.browser().await?;
        let browser = &chromium.browser;

        let context_id = match browser.execute(CreateBrowserContextParams::default()).await {
            Ok(created) => created.result.browser_context_id,
            Err(e) => {
                // A browser that cannot open a context is not coming back
                warn!(error = %e, "browser context failed, dropping browser");
                self.browser.discard(&chromium).await;
                return Err(FetchError::Render(format!("create context: {e}")));
            }
        };
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(FetchError::Render)?;
        let page = match browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                dispose_context(browser, context_id).await;
                return Err(FetchError::Render(format!("open page: {e}")));
            }
        };
        let guard = PageGuard::new(page, Arc::clone(&chromium), context_id, url.to_string());

        self.apply_fingerprint(guard.page()).await;
        copy_cookies_in(guard.page(), session, url).await;

        let navigation = guard.page().goto(url.as_str());
        match tokio::time::timeout(self.config.navigation_timeout, navigation).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(navigation_error(e.to_string())),
            // Load event never fired; read whatever rendered
            Err(_) => debug!("navigation timed out, reading partial render"),
        }

        self.dismiss_consent(guard.page()).await;
        self.wait_for_stable_dom(guard.page()).await;

        let page = guard.page();
        let html: String = evaluate(page, "document.documentElement.outerHTML").await?;
        let inner_text: String =
            evaluate(page, "document.body ? document.body.innerText : ''").await?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        copy_cookies_out(page, session, &final_url).await;
        guard.close().await;

        // innerText honors CSS visibility; fall back to a DOM walk when empty
        let text = if inner_text.trim().is_empty() {
            visible_text(&Html::parse_document(&html))
        } else {
            crate::fetcher::decode::normalize_whitespace(&inner_text)
        };

        if text.chars().count() < CHALLENGE_TEXT_LIMIT
            && let Some(marker) = find_challenge_marker(&html)
        {
            let err = FetchError::BotChallenge {
                status: None,
                marker,
            };
            return Ok(PageFetchResult::failure(url.clone(), FetchTier::Browser, &err)
                .with_body(final_url, html, text));
        }

        debug!(bytes = html.len(), text_chars = text.len(), "page rendered");
        Ok(PageFetchResult::success(
            url.clone(),
            final_url,
            FetchTier::Browser,
            None,
            html,
            text,
        ))
    }

    /// Viewport, locale, timezone, user agent and navigator overrides. Best effort.
    async fn apply_fingerprint(&self, page: &Page) {
        let (width, height) = self.config.viewport;
        let metrics =
            SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false);
        if let Err(e) = page.execute(metrics).await {
            debug!(error = %e, "viewport override failed");
        }
        if let Err(e) = page
            .execute(SetTimezoneOverrideParams::new(self.config.timezone.clone()))
            .await
        {
            debug!(error = %e, "timezone override failed");
        }
        let locale = SetLocaleOverrideParams {
            locale: Some(self.config.locale.clone()),
        };
        if let Err(e) = page.execute(locale).await {
            debug!(error = %e, "locale override failed");
        }
        if let Some(ua) = &self.user_agent {
            let mut params = SetUserAgentOverrideParams::new(ua.clone());
            params.accept_language = Some(self.config.locale.clone());
            if let Err(e) = page.execute(params).await {
                debug!(error = %e, "user agent override failed");
            }
        }

        let primary_lang = self.config.locale.split('-').next().unwrap_or("en");
        let languages = serde_json::json!([self.config.locale, primary_lang]).to_string();
        let source = FINGERPRINT_SCRIPT.replace("__LANGUAGES__", &languages);
        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
        {
            debug!(error = %e, "navigator overrides failed");
        }
    }

    /// Click the first consent button found within `consent_timeout`.
    async fn dismiss_consent(&self, page: &Page) {
        let keywords = serde_json::to_string(&self.config.consent_keywords)
            .unwrap_or_else(|_| "[]".to_string());
        let script = CONSENT_SCRIPT.replace("__KEYWORDS__", &keywords);
        let deadline = Instant::now() + self.config.consent_timeout;

        while Instant::now() < deadline {
            match evaluate::<bool>(page, &script).await {
                Ok(true) => {
                    debug!("cookie consent dismissed");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    trace!(error = %e, "consent check failed");
                    return;
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Poll the DOM size until it stops changing for `quiet_window` or
    /// `stability_cap` elapses.
    async fn wait_for_stable_dom(&self, page: &Page) {
        let started = Instant::now();
        let mut last_size: Option<i64> = None;
        let mut stable_since = Instant::now();

        while started.elapsed() < self.config.stability_cap {
            let size = match evaluate::<i64>(page, DOM_SIZE_SCRIPT).await {
                Ok(size) => size,
                Err(e) => {
                    trace!(error = %e, "dom size check failed");
                    return;
                }
            };
            if last_size != Some(size) {
                last_size = Some(size);
                stable_since = Instant::now();
            } else if stable_since.elapsed() >= self.config.quiet_window {
                trace!(size, "dom settled");
                return;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
        debug!("dom still changing at stability cap");
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    fn tier(&self) -> FetchTier {
        FetchTier::Browser
    }

    async fn fetch(&self, url: &Url, session: &TargetSession) -> PageFetchResult {
        BrowserFetcher::fetch(self, url, session).await
    }
}

async fn launch(config: &BrowserConfig) -> Result<Chromium, String> {
    let chrome_path = find_chromium(config.chromium_path.as_ref())
        .ok_or_else(|| "no Chromium executable found".to_string())?;
    let (width, height) = config.viewport;

    let chrome_config = ChromeConfig::builder()
        .chrome_executable(chrome_path)
        .window_size(width, height)
        .arg("--headless=new")
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--lang={}", config.locale))
        .build()
        .map_err(|e| format!("failed to build browser config: {e}"))?;

    let (browser, mut events) = Browser::launch(chrome_config)
        .await
        .map_err(|e| format!("failed to launch Chromium: {e}"))?;

    let handler = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Err(e) = event {
                trace!(error = %e, "browser handler event error");
            }
        }
    });

    debug!("chromium launched");
    Ok(Chromium { browser, handler })
}

async fn evaluate<T: serde::de::DeserializeOwned>(
    page: &Page,
    script: &str,
) -> Result<T, FetchError> {
    page.evaluate(script)
        .await
        .map_err(|e| FetchError::Render(format!("evaluate: {e}")))?
        .into_value::<T>()
        .map_err(|e| FetchError::Render(format!("evaluate result: {e}")))
}

fn navigation_error(message: String) -> FetchError {
    if message.contains("net::ERR_") {
        FetchError::Navigation(message)
    } else {
        FetchError::Render(message)
    }
}

/// Seed the page with the cookies the HTTP tier collected for `url`.
async fn copy_cookies_in(page: &Page, session: &TargetSession, url: &Url) {
    let Some(header) = session.jar().cookies(url) else {
        return;
    };
    let Ok(header) = header.to_str() else {
        return;
    };
    let cookies: Vec<CookieParam> = header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| {
            let mut cookie = CookieParam::new(name.to_string(), value.to_string());
            cookie.url = Some(url.to_string());
            cookie
        })
        .collect();
    if cookies.is_empty() {
        return;
    }
    if let Err(e) = page.set_cookies(cookies).await {
        debug!(error = %e, "copying cookies into browser failed");
    }
}

/// Bring cookies set while rendering back into the Target's jar.
async fn copy_cookies_out(page: &Page, session: &TargetSession, url: &Url) {
    let cookies = match page.get_cookies().await {
        Ok(cookies) => cookies,
        Err(e) => {
            debug!(error = %e, "reading browser cookies failed");
            return;
        }
    };
    for cookie in cookies {
        let domain = cookie.domain.trim_start_matches('.');
        let line = format!(
            "{}={}; Domain={}; Path={}",
            cookie.name, cookie.value, domain, cookie.path
        );
        session.jar().add_cookie_str(&line, url);
    }
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        debug!(error = %e, "disposing browser context failed");
    }
}

/// Owns a page and its browser context. `close` releases both; dropping the
/// guard without closing spawns the same cleanup on the runtime.
struct PageGuard {
    page: Page,
    chromium: Arc<Chromium>,
    context_id: BrowserContextId,
    url: String,
    released: bool,
    runtime_handle: tokio::runtime::Handle,
}

impl PageGuard {
    fn new(page: Page, chromium: Arc<Chromium>, context_id: BrowserContextId, url: String) -> Self {
        Self {
            page,
            chromium,
            context_id,
            url,
            released: false,
            runtime_handle: tokio::runtime::Handle::current(),
        }
    }

    fn page(&self) -> &Page {
        &self.page
    }

    async fn close(mut self) {
        self.released = true;
        if let Err(e) = self.page.clone().close().await {
            debug!(url = %self.url, error = %e, "closing page failed");
        }
        dispose_context(&self.chromium.browser, self.context_id.clone()).await;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let page = self.page.clone();
        let chromium = Arc::clone(&self.chromium);
        let context_id = self.context_id.clone();
        let url = std::mem::take(&mut self.url);
        self.runtime_handle.spawn(async move {
            if let Err(e) = page.close().await {
                debug!(url = %url, error = %e, "page cleanup on drop failed");
            }
            dispose_context(&chromium.browser, context_id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::config::HttpConfig;
    use crate::fetcher::errors::ErrorKind;

    #[test]
    fn navigation_errors_split_by_net_code() {
        assert_eq!(
            navigation_error("net::ERR_NAME_NOT_RESOLVED".to_string()).kind(),
            ErrorKind::NetworkFailure
        );
        assert_eq!(
            navigation_error("Target closed".to_string()).kind(),
            ErrorKind::RenderFailure
        );
    }

    #[test]
    fn prefers_a_chromium_user_agent() {
        let agents = vec![
            "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64) Chrome/124.0.0.0 Safari/537.36".to_string(),
        ];
        let fetcher = BrowserFetcher::new(BrowserConfig::default(), &agents);
        assert!(fetcher.user_agent.as_deref().is_some_and(|ua| ua.contains("Chrome/")));
    }

    #[tokio::test]
    async fn disabled_tier_reports_render_failure() {
        let config = BrowserConfig {
            enabled: false,
            ..BrowserConfig::default()
        };
        let fetcher = BrowserFetcher::new(config, &[]);
        let session = TargetSession::new(&HttpConfig::default()).unwrap();
        let url = Url::parse("https://firma.de/").unwrap();

        let result = fetcher.fetch(&url, &session).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::RenderFailure));
        assert_eq!(result.tier, FetchTier::Browser);
    }

    struct Instance {
        id: usize,
        alive: AtomicBool,
    }

    #[tokio::test]
    async fn failed_launch_is_retried_on_next_use() {
        let slot = LaunchSlot::new();
        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;
        let launch = move || async move {
            let id = attempts.fetch_add(1, Ordering::SeqCst);
            if id == 0 {
                Err("no Chromium executable found".to_string())
            } else {
                Ok(Instance {
                    id,
                    alive: AtomicBool::new(true),
                })
            }
        };
        let alive = |i: &Instance| i.alive.load(Ordering::SeqCst);

        let first = slot.get_or_launch(alive, launch).await;
        assert_eq!(first.err().as_deref(), Some("no Chromium executable found"));

        let second = slot.get_or_launch(alive, launch).await.unwrap();
        assert_eq!(second.id, 1);
        let cached = slot.get_or_launch(alive, launch).await.unwrap();
        assert!(Arc::ptr_eq(&second, &cached));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dead_or_discarded_instance_is_replaced() {
        let slot = LaunchSlot::new();
        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;
        let launch = move || async move {
            Ok(Instance {
                id: attempts.fetch_add(1, Ordering::SeqCst),
                alive: AtomicBool::new(true),
            })
        };
        let alive = |i: &Instance| i.alive.load(Ordering::SeqCst);

        let first = slot.get_or_launch(alive, launch).await.unwrap();
        first.alive.store(false, Ordering::SeqCst);
        let second = slot.get_or_launch(alive, launch).await.unwrap();
        assert_eq!(second.id, 1);

        // Discarding a stale handle leaves the newer instance in place
        slot.discard(&first).await;
        let still = slot.get_or_launch(alive, launch).await.unwrap();
        assert!(Arc::ptr_eq(&second, &still));

        slot.discard(&second).await;
        let third = slot.get_or_launch(alive, launch).await.unwrap();
        assert_eq!(third.id, 2);
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn renders_a_data_url() {
        let agents = HttpConfig::default().user_agents;
        let fetcher = BrowserFetcher::new(BrowserConfig::default(), &agents);
        let session = TargetSession::new(&HttpConfig::default()).unwrap();
        let url = Url::parse(
            "data:text/html,<body><script>document.body.innerHTML='<p>hello@firma.de</p>'</script></body>",
        )
        .unwrap();

        let result = fetcher.fetch(&url, &session).await;
        assert!(result.is_success(), "{:?}", result.error);
        assert!(result.text.contains("hello@firma.de"));
    }
}

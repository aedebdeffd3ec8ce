//! Configuration handling for the extractor.
//!
//! Everything the pipeline needs is gathered in a single [`Config`] value that
//! is built once (usually by [`Config::from_env`]) and handed to the
//! orchestrator and the fetch layer. Nothing in the crate reads environment
//! variables on its own.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Environment variable names. Public so tests and wrappers can refer to them.
pub const ENV_HTTP_TIMEOUT_MS: &str = "MAILSCOUT_HTTP_TIMEOUT_MS";
pub const ENV_BROWSER_TIMEOUT_MS: &str = "MAILSCOUT_BROWSER_TIMEOUT_MS";
pub const ENV_BROWSER_ENABLED: &str = "MAILSCOUT_BROWSER_ENABLED";
pub const ENV_TARGET_BUDGET_MS: &str = "MAILSCOUT_TARGET_BUDGET_MS";
pub const ENV_MAX_CANDIDATES: &str = "MAILSCOUT_MAX_CANDIDATES";
pub const ENV_MIN_RELEVANCE: &str = "MAILSCOUT_MIN_RELEVANCE";
pub const ENV_MIN_EMAILS: &str = "MAILSCOUT_MIN_EMAILS";
pub const ENV_HOMEPAGE_ONLY: &str = "MAILSCOUT_HOMEPAGE_ONLY";
pub const ENV_CONCURRENCY: &str = "MAILSCOUT_CONCURRENCY";
pub const ENV_MAX_ATTEMPTS: &str = "MAILSCOUT_MAX_ATTEMPTS";
pub const ENV_BACKOFF_BASE_MS: &str = "MAILSCOUT_BACKOFF_BASE_MS";
pub const ENV_RATE_LIMIT_MS: &str = "MAILSCOUT_RATE_LIMIT_MS";
pub const ENV_USER_AGENTS: &str = "MAILSCOUT_USER_AGENTS";
pub const ENV_OUTPUT_FILE: &str = "MAILSCOUT_OUTPUT_FILE";

/// Hard ceiling on candidate pages; discovery never returns more.
pub const MAX_CANDIDATE_PAGES: usize = 5;

const DEFAULT_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Application runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub browser: BrowserConfig,
    pub discovery: DiscoveryConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

/// Lightweight HTTP tier settings.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Deadline for a single request attempt, body included.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Deadline for a whole HTTP-tier call (all attempts and backoff).
    pub tier_deadline: Duration,
    pub user_agents: Vec<String>,
    /// Minimum spacing between two requests to the same host.
    pub rate_limit_interval: Duration,
    pub max_body_bytes: u64,
    /// Same-origin `<script src>` bodies fetched alongside a page.
    pub linked_scripts_max: usize,
}

/// Retry and backoff for the HTTP tier.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    /// Upper bound on how long a `Retry-After` hint is honored.
    pub max_retry_after: Duration,
}

/// Scripted-browser tier settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserConfig {
    pub enabled: bool,
    /// Hard cap for one browser fetch, navigation through content read.
    pub timeout: Duration,
    pub navigation_timeout: Duration,
    pub consent_timeout: Duration,
    /// DOM must stay unchanged this long to count as settled.
    pub quiet_window: Duration,
    pub stability_cap: Duration,
    pub poll_interval: Duration,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
    pub consent_keywords: Vec<String>,
    pub chromium_path: Option<PathBuf>,
}

/// Relevance scoring weights used by page discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub text_exact: f32,
    pub text_partial: f32,
    pub path_exact: f32,
    pub path_partial: f32,
    /// Multiplier applied to secondary (about/team/legal) keyword hits.
    pub secondary_factor: f32,
    pub primary_path_boost: f32,
    pub prominent_region: f32,
    pub query_penalty: f32,
    pub deep_path_penalty: f32,
    pub long_url_penalty: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub max_candidates: usize,
    pub min_relevance: f32,
    pub weights: ScoringWeights,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Wall-clock budget for one Target, homepage and candidates together.
    /// The homepage visit is cut off exactly at the budget.
    pub target_budget: Duration,
    /// Time in-flight candidate fetches get to wind down after the budget
    /// runs out. Only candidates get it: a Target can run up to
    /// `target_budget + grace_period` when its candidates are slow, but a
    /// homepage that outlasts the budget ends the Target at the budget.
    pub grace_period: Duration,
    pub candidate_concurrency: usize,
    /// Stop fetching further pages once this many distinct emails are known.
    pub min_emails: usize,
    pub homepage_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            tier_deadline: Duration::from_secs(45),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            rate_limit_interval: Duration::from_secs(1),
            max_body_bytes: 5 * 1024 * 1024,
            linked_scripts_max: 3,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(10),
            max_retry_after: Duration::from_secs(10),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(20),
            navigation_timeout: Duration::from_secs(15),
            consent_timeout: Duration::from_secs(3),
            quiet_window: Duration::from_millis(500),
            stability_cap: Duration::from_secs(5),
            poll_interval: Duration::from_millis(150),
            viewport: (1366, 768),
            locale: "en-US".to_string(),
            timezone: "Europe/Berlin".to_string(),
            consent_keywords: crate::patterns::CONSENT_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            chromium_path: None,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            text_exact: 8.0,
            text_partial: 5.0,
            path_exact: 7.0,
            path_partial: 5.0,
            secondary_factor: 0.6,
            primary_path_boost: 3.0,
            prominent_region: 2.0,
            query_penalty: 1.0,
            deep_path_penalty: 2.0,
            long_url_penalty: 2.0,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_candidates: MAX_CANDIDATE_PAGES,
            min_relevance: 5.0,
            weights: ScoringWeights::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_budget: Duration::from_secs(120),
            grace_period: Duration::from_secs(2),
            candidate_concurrency: 3,
            min_emails: 3,
            homepage_only: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output.txt"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            browser: BrowserConfig::default(),
            discovery: DiscoveryConfig::default(),
            pipeline: PipelineConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load from environment variables, falling back to the defaults above.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = env_parse::<u64>(ENV_HTTP_TIMEOUT_MS)? {
            config.http.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>(ENV_BROWSER_TIMEOUT_MS)? {
            config.browser.timeout = Duration::from_millis(ms);
        }
        if let Some(enabled) = env_parse::<bool>(ENV_BROWSER_ENABLED)? {
            config.browser.enabled = enabled;
        }
        if let Some(ms) = env_parse::<u64>(ENV_TARGET_BUDGET_MS)? {
            config.pipeline.target_budget = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>(ENV_MAX_CANDIDATES)? {
            config.discovery.max_candidates = n;
        }
        if let Some(score) = env_parse::<f32>(ENV_MIN_RELEVANCE)? {
            config.discovery.min_relevance = score;
        }
        if let Some(n) = env_parse::<usize>(ENV_MIN_EMAILS)? {
            config.pipeline.min_emails = n;
        }
        if let Some(flag) = env_parse::<bool>(ENV_HOMEPAGE_ONLY)? {
            config.pipeline.homepage_only = flag;
        }
        if let Some(n) = env_parse::<usize>(ENV_CONCURRENCY)? {
            config.pipeline.candidate_concurrency = n;
        }
        if let Some(n) = env_parse::<u32>(ENV_MAX_ATTEMPTS)? {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = env_parse::<u64>(ENV_BACKOFF_BASE_MS)? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>(ENV_RATE_LIMIT_MS)? {
            config.http.rate_limit_interval = Duration::from_millis(ms);
        }
        if let Ok(agents) = env::var(ENV_USER_AGENTS) {
            config.http.user_agents = agents
                .split('|')
                .map(str::trim)
                .filter(|ua| !ua.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(path) = env::var(ENV_OUTPUT_FILE) {
            config.output.path = PathBuf::from(path);
        }
        if let Ok(path) = env::var(crate::fetcher::browser::ENV_CHROMIUM_PATH) {
            config.browser.chromium_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Range checks shared by `from_env` and hand-built configs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.max_candidates > MAX_CANDIDATE_PAGES {
            return Err(ConfigError::InvalidValue {
                field: "discovery.max_candidates",
                reason: format!("must be at most {MAX_CANDIDATE_PAGES}"),
            });
        }
        if self.http.user_agents.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "http.user_agents",
                reason: "at least one user agent is required".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.factor == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.factor",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pipeline.candidate_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.candidate_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pipeline.min_emails == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.min_emails",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pipeline.target_budget.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.target_budget",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: key,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur while building a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

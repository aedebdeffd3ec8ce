use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by fetch results, page summaries and target outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NetworkFailure,
    HttpStatusError,
    Timeout,
    RenderFailure,
    BotChallengeDetected,
    NoCandidatesFound,
    NoEmailFound,
    UnsupportedContent,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkFailure => "network-failure",
            Self::HttpStatusError => "http-status-error",
            Self::Timeout => "timeout",
            Self::RenderFailure => "render-failure",
            Self::BotChallengeDetected => "bot-challenge-detected",
            Self::NoCandidatesFound => "no-candidates-found",
            Self::NoEmailFound => "no-email-found",
            Self::UnsupportedContent => "unsupported-content",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("dns failure: {0}")]
    Dns(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("request timeout")]
    RequestTimeout,

    #[error("too many redirects")]
    RedirectLoop,

    #[error("http error {status}")]
    Http {
        status: reqwest::StatusCode,
        retriable: bool,
    },

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("bot challenge detected ({marker})")]
    BotChallenge {
        status: Option<u16>,
        marker: &'static str,
    },

    #[error("body too large ({0} bytes)")]
    BodyTooLarge(u64),

    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("browser navigation failed: {0}")]
    Navigation(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("deadline of {0:?} exceeded")]
    Deadline(Duration),

    #[error("unknown: {0}")]
    Unknown(String),
}

impl FetchError {
    pub fn should_retry(&self) -> bool {
        match self {
            // Fatal errors - don't retry
            Self::InvalidUrl(_) => false,
            Self::BodyTooLarge(_) => false,
            Self::UnsupportedContentType(_) => false,
            Self::BotChallenge { .. } => false,
            Self::Http { retriable, .. } => *retriable,
            Self::BrowserUnavailable(_) => false,
            Self::Navigation(_) => false,
            Self::Render(_) => false,
            Self::Deadline(_) => false,
            Self::RedirectLoop => false,

            // Temporary errors - retry
            Self::RateLimited { .. } => true,
            Self::Dns(_) => true,
            Self::Connect(_) => true,
            Self::ConnectTimeout => true,
            Self::RequestTimeout => true,
            Self::Io(_) => true,
            Self::Unknown(_) => true,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_)
            | Self::Dns(_)
            | Self::Connect(_)
            | Self::RedirectLoop
            | Self::Io(_)
            | Self::Navigation(_)
            | Self::Unknown(_) => ErrorKind::NetworkFailure,
            Self::ConnectTimeout | Self::RequestTimeout | Self::Deadline(_) => ErrorKind::Timeout,
            Self::Http { .. } | Self::RateLimited { .. } => ErrorKind::HttpStatusError,
            Self::BotChallenge { .. } => ErrorKind::BotChallengeDetected,
            Self::BodyTooLarge(_) | Self::UnsupportedContentType(_) => {
                ErrorKind::UnsupportedContent
            }
            Self::BrowserUnavailable(_) | Self::Render(_) => ErrorKind::RenderFailure,
        }
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            if err.is_connect() {
                Self::ConnectTimeout
            } else {
                Self::RequestTimeout
            }
        } else if err.is_redirect() {
            Self::RedirectLoop
        } else if let Some(status) = err.status() {
            Self::Http {
                status,
                retriable: status.is_server_error(),
            }
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_request() {
            // DNS, connection resets before a response
            Self::Dns(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Io(err.to_string())
        } else {
            Self::Unknown(err.to_string())
        }
    }
}

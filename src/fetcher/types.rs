use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetcher::errors::{ErrorKind, FetchError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Charset {
    Utf8,
    Latin1,
    Windows1252,
    Iso88591,
    ShiftJis,
    Gb2312,
    Big5,
    Other(String),
}

impl Charset {
    pub fn from_encoding(encoding: &'static encoding_rs::Encoding) -> Self {
        use std::ptr;

        if ptr::eq(encoding, encoding_rs::UTF_8) {
            Self::Utf8
        } else if ptr::eq(encoding, encoding_rs::WINDOWS_1252) {
            Self::Windows1252
        } else if ptr::eq(encoding, encoding_rs::SHIFT_JIS) {
            Self::ShiftJis
        } else if ptr::eq(encoding, encoding_rs::GBK) || ptr::eq(encoding, encoding_rs::GB18030) {
            Self::Gb2312
        } else if ptr::eq(encoding, encoding_rs::BIG5) {
            Self::Big5
        } else {
            Self::Other(encoding.name().to_string())
        }
    }
}

/// Which tier produced a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchTier {
    Http,
    Browser,
}

impl fmt::Display for FetchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Browser => f.write_str("browser"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&FetchError> for PageError {
    fn from(err: &FetchError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of fetching one URL on one tier. Successful results carry the
/// decoded HTML and its visible text; failed ones carry an error and may
/// still carry whatever body was received (a challenge page, say).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFetchResult {
    pub requested_url: Url,
    /// URL after redirects; equals `requested_url` when nothing was received.
    pub final_url: Url,
    pub tier: FetchTier,
    pub status: Option<u16>,
    pub html: String,
    pub text: String,
    /// Bodies of same-origin `<script src>` files fetched with the page.
    pub scripts: Vec<String>,
    pub charset: Option<Charset>,
    pub fetched_at: DateTime<Utc>,
    pub error: Option<PageError>,
}

impl PageFetchResult {
    pub fn success(
        requested_url: Url,
        final_url: Url,
        tier: FetchTier,
        status: Option<u16>,
        html: String,
        text: String,
    ) -> Self {
        Self {
            requested_url,
            final_url,
            tier,
            status,
            html,
            text,
            scripts: Vec::new(),
            charset: None,
            fetched_at: Utc::now(),
            error: None,
        }
    }

    pub fn failure(requested_url: Url, tier: FetchTier, err: &FetchError) -> Self {
        let status = match err {
            FetchError::Http { status, .. } => Some(status.as_u16()),
            FetchError::RateLimited { .. } => Some(429),
            FetchError::BotChallenge { status, .. } => *status,
            _ => None,
        };
        Self {
            final_url: requested_url.clone(),
            requested_url,
            tier,
            status,
            html: String::new(),
            text: String::new(),
            scripts: Vec::new(),
            charset: None,
            fetched_at: Utc::now(),
            error: Some(PageError::from(err)),
        }
    }

    pub fn with_scripts(mut self, scripts: Vec<String>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = Some(charset);
        self
    }

    /// Attach the body that came with a failed response.
    pub fn with_body(mut self, final_url: Url, html: String, text: String) -> Self {
        self.final_url = final_url;
        self.html = html;
        self.text = text;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

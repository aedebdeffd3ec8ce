pub mod backoff;
pub mod browser;
pub mod client;
pub mod decode;
pub mod errors;
pub mod escalation;
pub mod rate_limit;
pub mod session;
pub mod strategy;
pub mod types;

pub use browser::BrowserFetcher;
pub use client::HttpFetcher;
pub use errors::{ErrorKind, FetchError};
pub use escalation::{EscalationReason, RenderSignal, escalation_reason};
pub use rate_limit::HostRateLimiter;
pub use session::TargetSession;
pub use strategy::{FetchStrategy, PageFetcher};
pub use types::{Charset, FetchTier, PageError, PageFetchResult};

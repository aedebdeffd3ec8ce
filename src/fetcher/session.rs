use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::{Client, ClientBuilder};

use crate::config::HttpConfig;
use crate::fetcher::errors::FetchError;

/// Per-Target fetch state: one cookie jar shared by both tiers, and an HTTP
/// client bound to it. Dropped together with the Target.
#[derive(Clone, Debug)]
pub struct TargetSession {
    jar: Arc<Jar>,
    client: Client,
}

impl TargetSession {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let jar = Arc::new(Jar::default());
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_provider(Arc::clone(&jar))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static(
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    ),
                );
                headers.insert(
                    reqwest::header::ACCEPT_LANGUAGE,
                    reqwest::header::HeaderValue::from_static("en-US,en;q=0.9,de;q=0.8"),
                );
                headers
            })
            .build()
            .map_err(|e| FetchError::Unknown(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { jar, client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }
}

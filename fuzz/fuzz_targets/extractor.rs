#![no_main]

use libfuzzer_sys::fuzz_target;
use url::Url;

use mailscout::discovery::discover;
use mailscout::config::DiscoveryConfig;
use mailscout::extractor::extract;
use mailscout::fetcher::{FetchTier, PageFetchResult};

fuzz_target!(|data: &[u8]| {
    let html = String::from_utf8_lossy(data).to_string();
    let Ok(url) = Url::parse("https://firma.de/") else {
        return;
    };

    let page = PageFetchResult::success(url.clone(), url, FetchTier::Http, Some(200), html, String::new());

    // Neither stage may panic on arbitrary markup
    let emails = extract(&page);
    for record in &emails {
        assert_eq!(record.address, record.address.to_lowercase());
    }
    let _ = discover(&page, &DiscoveryConfig::default());
});

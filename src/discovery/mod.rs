//! Contact-page discovery: pick the few links on a homepage most likely to
//! lead to contact, imprint or team pages.

pub mod links;
pub mod scoring;

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::{DiscoveryConfig, MAX_CANDIDATE_PAGES};
use crate::fetcher::types::PageFetchResult;

pub use links::{RawLink, collect_links, normalize_href};
pub use scoring::score_link;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateLink {
    pub url: Url,
    pub anchor_text: String,
    pub score: f32,
    /// Page the link was found on.
    pub source: Url,
}

impl CandidateLink {
    pub fn depth(&self) -> usize {
        links::path_segments(&self.url).len()
    }
}

/// Ordered candidates from `homepage`: best score first, then shallower
/// path, then URL. At most `min(config.max_candidates, 5)`.
pub fn discover(homepage: &PageFetchResult, config: &DiscoveryConfig) -> Vec<CandidateLink> {
    let sites = [&homepage.requested_url, &homepage.final_url];
    let raw = collect_links(&homepage.html, &homepage.final_url, &sites, &sites);

    // Same URL linked several times keeps its best-scoring anchor
    let mut best: HashMap<Url, CandidateLink> = HashMap::new();
    for link in raw {
        let score = score_link(&link, &config.weights);
        if score < config.min_relevance {
            continue;
        }
        let candidate = CandidateLink {
            url: link.url,
            anchor_text: link.anchor_text,
            score,
            source: homepage.final_url.clone(),
        };
        match best.get(&candidate.url) {
            Some(existing) if existing.score >= candidate.score => {}
            _ => {
                best.insert(candidate.url.clone(), candidate);
            }
        }
    }

    let mut candidates: Vec<CandidateLink> = best.into_values().collect();
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.depth().cmp(&b.depth()))
            .then_with(|| a.url.as_str().cmp(b.url.as_str()))
    });
    candidates.truncate(config.max_candidates.min(MAX_CANDIDATE_PAGES));

    debug!(
        count = candidates.len(),
        top = candidates.first().map(|c| c.url.as_str()).unwrap_or(""),
        "candidates discovered"
    );
    candidates
}

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::discovery::CandidateLink;
use crate::extractor::EmailSet;
use crate::fetcher::errors::ErrorKind;
use crate::fetcher::types::{FetchTier, PageFetchResult};

/// Where a Target's processing is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Init,
    FetchHomepage,
    ExtractHomepage,
    DiscoverLinks,
    FetchCandidates,
    Merge,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::FetchHomepage => "fetch-homepage",
            Stage::ExtractHomepage => "extract-homepage",
            Stage::DiscoverLinks => "discover-links",
            Stage::FetchCandidates => "fetch-candidates",
            Stage::Merge => "merge",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TargetOutcome {
    Success { emails: EmailSet },
    Failure { reason: ErrorKind, emails: EmailSet },
}

impl TargetOutcome {
    pub fn emails(&self) -> &EmailSet {
        match self {
            TargetOutcome::Success { emails } | TargetOutcome::Failure { emails, .. } => emails,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TargetOutcome::Success { .. })
    }

    pub fn reason(&self) -> Option<ErrorKind> {
        match self {
            TargetOutcome::Success { .. } => None,
            TargetOutcome::Failure { reason, .. } => Some(*reason),
        }
    }
}

/// One fetch attempt on one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub url: Url,
    pub final_url: Url,
    pub tier: FetchTier,
    pub success: bool,
    pub error: Option<ErrorKind>,
    pub emails_found: usize,
}

impl PageSummary {
    pub fn new(result: &PageFetchResult, emails_found: usize) -> Self {
        Self {
            url: result.requested_url.clone(),
            final_url: result.final_url.clone(),
            tier: result.tier,
            success: result.is_success(),
            error: result.error_kind(),
            emails_found,
        }
    }
}

/// A page-level problem that did not end the Target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoftFailure {
    pub url: Url,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target_id: Uuid,
    pub root: Url,
    pub pages: Vec<PageSummary>,
    pub soft_failures: Vec<SoftFailure>,
    pub candidates: Vec<CandidateLink>,
    /// Last stage entered; `Done` unless the budget ran out.
    pub stage: Stage,
    pub elapsed: Duration,
}

impl TargetReport {
    pub fn new(target_id: Uuid, root: Url) -> Self {
        Self {
            target_id,
            root,
            pages: Vec::new(),
            soft_failures: Vec::new(),
            candidates: Vec::new(),
            stage: Stage::Init,
            elapsed: Duration::ZERO,
        }
    }

    pub fn browser_fetches(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| p.tier == FetchTier::Browser)
            .count()
    }
}

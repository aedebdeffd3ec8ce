use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use crate::config::Config;
use crate::discovery::discover;
use crate::extractor::EmailSet;
use crate::fetcher::errors::ErrorKind;
use crate::fetcher::session::TargetSession;
use crate::fetcher::strategy::FetchStrategy;
use crate::pipeline::report::{SoftFailure, Stage, TargetOutcome, TargetReport};
use crate::pipeline::target::Target;
use crate::pipeline::visit::{PageVisit, visit};

/// Drives one Target through homepage, discovery and candidate pages within
/// the configured budget.
pub struct Orchestrator {
    config: Arc<Config>,
    strategy: FetchStrategy,
}

type CandidateJoin = Result<(usize, Option<PageVisit>), JoinError>;

impl Orchestrator {
    pub fn new(config: Config, strategy: FetchStrategy) -> Self {
        Self {
            config: Arc::new(config),
            strategy,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn process(&self, target: &Target) -> (TargetOutcome, TargetReport) {
        let span = info_span!("target", target_id = %target.id, root = %target.root);
        self.run(target).instrument(span).await
    }

    async fn run(&self, target: &Target) -> (TargetOutcome, TargetReport) {
        let started = Instant::now();
        let deadline = started + self.config.pipeline.target_budget;
        let min_emails = self.config.pipeline.min_emails;
        let mut report = TargetReport::new(target.id, target.root.clone());
        let mut emails = EmailSet::new();

        info!("processing target");

        let session = match TargetSession::new(&self.config.http) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                warn!(error = %e, "could not build http session");
                let outcome = TargetOutcome::Failure {
                    reason: e.kind(),
                    emails,
                };
                return finish(outcome, report, started);
            }
        };

        // Homepage, cut at the budget with no grace period
        report.stage = Stage::FetchHomepage;
        let homepage = match timeout_at(deadline, visit(&self.strategy, &target.root, &session)).await
        {
            Ok(homepage) => homepage,
            Err(_) => {
                warn!(stage = %report.stage, "target budget exhausted");
                let outcome = TargetOutcome::Failure {
                    reason: ErrorKind::Timeout,
                    emails,
                };
                return finish(outcome, report, started);
            }
        };

        report.stage = Stage::ExtractHomepage;
        report.pages.extend(homepage.attempts.iter().cloned());
        emails.merge(homepage.emails.clone());
        debug!(emails = emails.len(), "homepage extracted");

        if let Some(kind) = homepage.failure {
            warn!(kind = %kind, "homepage unreachable");
            return finish(TargetOutcome::Failure { reason: kind, emails }, report, started);
        }

        if emails.len() >= min_emails || self.config.pipeline.homepage_only {
            report.stage = Stage::Merge;
            return finish(settle(emails, false), report, started);
        }

        // Discovery
        report.stage = Stage::DiscoverLinks;
        let candidates = discover(&homepage.page, &self.config.discovery);
        if candidates.is_empty() {
            warn!(kind = %ErrorKind::NoCandidatesFound, "no candidate pages");
            report.soft_failures.push(SoftFailure {
                url: homepage.page.final_url.clone(),
                kind: ErrorKind::NoCandidatesFound,
            });
            report.stage = Stage::Merge;
            return finish(settle(emails, false), report, started);
        }
        report.candidates = candidates.clone();

        // Candidates
        report.stage = Stage::FetchCandidates;
        let urls: Vec<Url> = candidates.into_iter().map(|c| c.url).collect();
        let (visits, timed_out) = self
            .fetch_candidates(&target.id.to_string(), urls, session, &emails, deadline)
            .await;

        report.stage = Stage::Merge;
        for page in visits.into_iter().flatten() {
            report.pages.extend(page.attempts);
            if let Some(kind) = page.failure {
                warn!(url = %page.page.requested_url, kind = %kind, "candidate page skipped");
                report.soft_failures.push(SoftFailure {
                    url: page.page.requested_url.clone(),
                    kind,
                });
            }
            emails.merge(page.emails);
        }

        finish(settle(emails, timed_out), report, started)
    }

    /// Visit candidates concurrently. Results come back indexed by candidate
    /// rank; the flag reports whether the budget ran out.
    async fn fetch_candidates(
        &self,
        target_id: &str,
        urls: Vec<Url>,
        session: Arc<TargetSession>,
        known: &EmailSet,
        deadline: Instant,
    ) -> (Vec<Option<PageVisit>>, bool) {
        let semaphore = Arc::new(Semaphore::new(self.config.pipeline.candidate_concurrency.max(1)));
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut results: Vec<Option<PageVisit>> = (0..urls.len()).map(|_| None).collect();

        for (rank, url) in urls.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let strategy = self.strategy.clone();
            let session = session.clone();
            let span = info_span!("candidate", target_id = %target_id, rank, url = %url);

            tasks.spawn(
                async move {
                    let _permit = tokio::select! {
                        _ = cancel.cancelled() => return (rank, None),
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return (rank, None),
                        },
                    };
                    if cancel.is_cancelled() {
                        return (rank, None);
                    }
                    (rank, Some(visit(&strategy, &url, &session).await))
                }
                .instrument(span),
            );
        }

        let min_emails = self.config.pipeline.min_emails;
        let mut seen = known.clone();
        let mut timed_out = false;

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    absorb(joined, &mut results, &mut seen);
                    if seen.len() >= min_emails {
                        debug!(emails = seen.len(), "enough emails, stopping early");
                        cancel.cancel();
                        tasks.abort_all();
                        break;
                    }
                }
                _ = sleep_until(deadline) => {
                    warn!(stage = %Stage::FetchCandidates, "target budget exhausted");
                    timed_out = true;
                    cancel.cancel();

                    let grace_deadline = Instant::now() + self.config.pipeline.grace_period;
                    while let Ok(Some(joined)) = timeout_at(grace_deadline, tasks.join_next()).await {
                        absorb(joined, &mut results, &mut seen);
                    }
                    tasks.abort_all();
                    break;
                }
            }
        }

        (results, timed_out)
    }
}

fn absorb(joined: CandidateJoin, results: &mut [Option<PageVisit>], seen: &mut EmailSet) {
    match joined {
        Ok((rank, Some(visit))) => {
            seen.merge(visit.emails.clone());
            results[rank] = Some(visit);
        }
        Ok((_, None)) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(error = %e, "candidate task failed"),
    }
}

fn settle(emails: EmailSet, timed_out: bool) -> TargetOutcome {
    if timed_out {
        TargetOutcome::Failure {
            reason: ErrorKind::Timeout,
            emails,
        }
    } else if emails.is_empty() {
        TargetOutcome::Failure {
            reason: ErrorKind::NoEmailFound,
            emails,
        }
    } else {
        TargetOutcome::Success { emails }
    }
}

fn finish(
    outcome: TargetOutcome,
    mut report: TargetReport,
    started: Instant,
) -> (TargetOutcome, TargetReport) {
    if !matches!(outcome.reason(), Some(ErrorKind::Timeout)) {
        report.stage = Stage::Done;
    }
    report.elapsed = started.elapsed();
    match outcome.reason() {
        None => info!(
            emails = outcome.emails().len(),
            pages = report.pages.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "target done"
        ),
        Some(reason) => info!(
            reason = %reason,
            emails = outcome.emails().len(),
            pages = report.pages.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "target failed"
        ),
    }
    (outcome, report)
}

use anyhow::{Context, Result};
use mailscout::{
    config::Config,
    fetcher::{FetchStrategy, HostRateLimiter},
    output::EmailSink,
    pipeline::{Orchestrator, Target, TargetOutcome},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_SENTINELS: &[&str] = &["exit", "quit", "q"];

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailscout=info"));
    if std::env::var("MAILSCOUT_LOG_JSON").is_ok_and(|v| v == "1") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Load configuration
    let config = Config::from_env().context("invalid configuration")?;
    info!(
        budget_s = config.pipeline.target_budget.as_secs(),
        browser = config.browser.enabled,
        output = %config.output.path.display(),
        "mailscout starting"
    );

    let limiter = HostRateLimiter::new(config.http.rate_limit_interval);
    let strategy = FetchStrategy::from_config(&config, limiter);
    let mut sink = EmailSink::open(&config.output).await?;
    let orchestrator = Orchestrator::new(config, strategy);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("url> ");
        let line = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if EXIT_SENTINELS.contains(&input.to_ascii_lowercase().as_str()) {
            break;
        }

        let target = match Target::parse(input) {
            Ok(target) => target,
            Err(e) => {
                warn!(input, error = %e, "skipping input");
                println!("{input}\tinvalid: {e}");
                continue;
            }
        };

        let (outcome, report) = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            result = orchestrator.process(&target) => result,
        };

        if let Err(e) = sink.write(outcome.emails()).await {
            error!(error = %e, path = %sink.path().display(), "failed to write emails");
        }

        let addresses = outcome.emails().addresses().join(", ");
        match &outcome {
            TargetOutcome::Success { emails } => {
                println!(
                    "{target}\tok\t{} email(s) in {:.1}s\t{addresses}",
                    emails.len(),
                    report.elapsed.as_secs_f32()
                );
            }
            TargetOutcome::Failure { reason, emails } => {
                println!(
                    "{target}\t{reason}\t{} email(s) in {:.1}s\t{addresses}",
                    emails.len(),
                    report.elapsed.as_secs_f32()
                );
            }
        }
    }

    info!("done");
    Ok(())
}

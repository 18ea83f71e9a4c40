//! Outreach follow-up runner
//!
//! Classifies a candidate list against the event log and sends each patient
//! the follow-up email for their segment.
//!
//! Run with: cargo run --bin outreach -- --candidates candidates.csv

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Parser;
use outreach::followup::load_candidates;
use outreach::{BehaviorClassifier, Config, EmailClient, FollowupJob, SqliteEventStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "outreach")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send segment-based follow-up emails to matched patients")]
struct Args {
    /// CSV with `secure_uuid,patient_id,email[,name]` columns
    #[arg(short, long)]
    candidates: PathBuf,

    /// Look-back window in days
    #[arg(short, long, default_value = "30")]
    days: i64,

    /// Config file (default: standard locations, then environment)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the planned variants without sending
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    config.logging.init();

    tracing::info!("Outreach follow-up runner v{}", env!("CARGO_PKG_VERSION"));

    let candidates = load_candidates(&args.candidates)
        .with_context(|| format!("reading candidates from {:?}", args.candidates))?;
    tracing::info!(count = candidates.len(), "Loaded candidates");

    let store = Arc::new(
        SqliteEventStore::open(Path::new(&config.events.database_path))
            .with_context(|| format!("opening event log {}", config.events.database_path))?,
    );
    let classifier = BehaviorClassifier::new(store).max_rows(config.events.max_rows);
    let email = EmailClient::new(&config)?;

    if !email.is_enabled() && !args.dry_run {
        tracing::warn!("No email API key configured; every send will be skipped");
    }

    let job = FollowupJob::new(classifier, email, config.site.clone());
    let since = Utc::now() - Duration::days(args.days);

    if args.dry_run {
        for (candidate, variant) in job.plan(&candidates, since).await {
            let template = variant.as_ref().map(|v| v.template()).unwrap_or("-");
            println!("{}\t{}\t{}", candidate.patient_id, candidate.email, template);
        }
        return Ok(());
    }

    let report = job.run(&candidates, since).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failed > 0 {
        anyhow::bail!("{} follow-up email(s) failed", report.failed);
    }

    Ok(())
}

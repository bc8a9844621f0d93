use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use apply_pilot::config::BatchSettings;
use apply_pilot::error::AppError;
use apply_pilot::pipeline::memory::{
    InMemoryApplicationRepository, InMemoryApplyQueue, InMemoryAuditLog, InMemoryFactStore,
    RecordingSubmissionSink,
};
use apply_pilot::pipeline::{
    ApplicationFilter, ApplyQueue, BatchProcessor, PipelineError, PolicyConfig,
};

use crate::infra::{demo_bullet_bank, demo_jobs, demo_profile};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Minimum match score a job needs to be pursued
    #[arg(long, default_value_t = 60.0)]
    pub(crate) min_score: f32,
    /// Maximum submissions per trailing 24 hours (0 disables the limit)
    #[arg(long, default_value_t = 0)]
    pub(crate) daily_limit: u32,
    /// Companies to exclude, matched as case-insensitive substrings
    #[arg(long, value_delimiter = ',')]
    pub(crate) blocklist: Vec<String>,
    /// Only pursue remote listings
    #[arg(long)]
    pub(crate) remote_only: bool,
}

/// Drain the demo queue end to end against a recording portal and print
/// what the pipeline did with each listing.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let policy = PolicyConfig {
        daily_limit: args.daily_limit,
        blocked_companies: args.blocklist.clone(),
        min_match_score: args.min_score,
        remote_only: args.remote_only,
        ..PolicyConfig::default()
    };

    let queue = Arc::new(InMemoryApplyQueue::default());
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let sink = Arc::new(RecordingSubmissionSink::default());
    let audit = Arc::new(InMemoryAuditLog::default());
    let facts = Arc::new(InMemoryFactStore::with_profile(
        demo_profile(),
        demo_bullet_bank(),
    ));

    let seeded = queue.enqueue(demo_jobs()).map_err(PipelineError::Queue)?;

    let processor = Arc::new(BatchProcessor::new(
        queue.clone(),
        repository,
        sink.clone(),
        facts,
        audit.clone(),
        policy,
        BatchSettings {
            pacing_min: Duration::ZERO,
            pacing_max: Duration::ZERO,
            ..BatchSettings::default()
        },
    ));

    println!("Autonomous application pipeline demo");
    println!("  queued listings: {seeded}");
    println!(
        "  policy: min score {:.0}, daily limit {}, blocklist [{}], remote only {}",
        args.min_score,
        if args.daily_limit == 0 {
            "off".to_string()
        } else {
            args.daily_limit.to_string()
        },
        args.blocklist.join(", "),
        args.remote_only
    );

    processor.run_until_idle().await?;

    println!("\nOutcomes");
    let filter = ApplicationFilter {
        limit: Some(usize::MAX),
        ..ApplicationFilter::default()
    };
    for view in processor.applications(&filter)? {
        let detail = view
            .receipt_id
            .as_deref()
            .map(|receipt| format!("receipt {receipt}"))
            .or_else(|| view.failure_reason.clone())
            .unwrap_or_default();
        println!(
            "  [{:>14}] {} - {} (score {:.0}) {}",
            view.status, view.company, view.title, view.match_score, detail
        );
    }

    let summary = processor.tracker_summary()?;
    println!("\nSummary");
    println!("  applications: {}", summary.total_applications);
    println!("  submitted:    {}", summary.submitted_count);
    println!("  failed:       {}", summary.failed_count);
    println!("  success rate: {:.1}%", summary.success_rate);

    let status = processor.status();
    println!("\nRun log");
    for line in &status.recent_logs {
        println!("  {line}");
    }

    Ok(())
}

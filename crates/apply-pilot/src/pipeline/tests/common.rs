use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::config::BatchSettings;
use crate::pipeline::domain::{
    Application, ApplicationPackage, BulletEntry, CandidateProfile, ExperienceFact, JobId,
    JobPosting, MatchBreakdown, QueuedJob,
};
use crate::pipeline::memory::{
    InMemoryApplicationRepository, InMemoryApplyQueue, InMemoryAuditLog, InMemoryFactStore,
    RecordingSubmissionSink,
};
use crate::pipeline::policy::PolicyConfig;
use crate::pipeline::processor::BatchProcessor;
use crate::pipeline::repository::{
    ApplicationRepository, SubmissionError, SubmissionReceipt, SubmissionSink,
};

pub(super) fn profile() -> CandidateProfile {
    CandidateProfile {
        name: "Dana Osei".to_string(),
        email: "dana@example.com".to_string(),
        phone: "+1-555-0100".to_string(),
        skills: vec![
            "Rust".to_string(),
            "Python".to_string(),
            "Kubernetes".to_string(),
            "PostgreSQL".to_string(),
        ],
        experience: vec![
            ExperienceFact {
                company: "Initech".to_string(),
                title: "Backend Engineer".to_string(),
                bullets: vec![
                    "Built the billing service in Rust".to_string(),
                    "Cut p99 latency by 35% for the checkout service".to_string(),
                ],
            },
            ExperienceFact {
                company: "Hooli".to_string(),
                title: "Platform Engineer".to_string(),
                bullets: vec!["Ran Kubernetes clusters for forty internal teams".to_string()],
            },
        ],
    }
}

pub(super) fn bullet_bank() -> Vec<BulletEntry> {
    vec![
        BulletEntry {
            source_company: "Initech".to_string(),
            text: "Built the billing service in Rust".to_string(),
        },
        BulletEntry {
            source_company: "Initech".to_string(),
            text: "Cut p99 latency by 35% for the checkout service".to_string(),
        },
        BulletEntry {
            source_company: "Initech".to_string(),
            text: "Migrated batch reporting to PostgreSQL".to_string(),
        },
        BulletEntry {
            source_company: "Hooli".to_string(),
            text: "Ran Kubernetes clusters for forty internal teams".to_string(),
        },
        BulletEntry {
            source_company: "Hooli".to_string(),
            text: "Automated cluster upgrades with Python tooling".to_string(),
        },
    ]
}

pub(super) fn queued(id: &str, company: &str, score: f32) -> QueuedJob {
    QueuedJob {
        job: JobPosting {
            id: JobId(id.to_string()),
            company: company.to_string(),
            title: "Platform Engineer".to_string(),
            location: "Remote".to_string(),
            description: "Own our Rust services and the Kubernetes platform they run on."
                .to_string(),
            skills_required: vec!["Rust".to_string(), "Kubernetes".to_string()],
            remote: true,
            url: None,
        },
        match_score: score,
        breakdown: MatchBreakdown {
            skills: score,
            experience: score,
            constraints: score,
        },
        queued_at: Utc::now(),
        rank: 0,
    }
}

/// Pacing disabled so loop tests finish immediately.
pub(super) fn fast_settings() -> BatchSettings {
    BatchSettings {
        pacing_min: Duration::ZERO,
        pacing_max: Duration::ZERO,
        lease_timeout: Duration::from_secs(60),
    }
}

pub(super) fn permissive_policy() -> PolicyConfig {
    PolicyConfig {
        min_match_score: 0.0,
        ..PolicyConfig::default()
    }
}

pub(super) type TestProcessor = BatchProcessor<
    InMemoryApplyQueue,
    InMemoryApplicationRepository,
    RecordingSubmissionSink,
    InMemoryFactStore,
>;

pub(super) struct PipelineHarness {
    pub(super) processor: Arc<TestProcessor>,
    pub(super) queue: Arc<InMemoryApplyQueue>,
    pub(super) repository: Arc<InMemoryApplicationRepository>,
    pub(super) sink: Arc<RecordingSubmissionSink>,
    pub(super) audit: Arc<InMemoryAuditLog>,
}

pub(super) fn harness(policy: PolicyConfig) -> PipelineHarness {
    harness_with_facts(
        policy,
        InMemoryFactStore::with_profile(profile(), bullet_bank()),
    )
}

pub(super) fn harness_with_facts(policy: PolicyConfig, facts: InMemoryFactStore) -> PipelineHarness {
    let queue = Arc::new(InMemoryApplyQueue::default());
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let sink = Arc::new(RecordingSubmissionSink::default());
    let audit = Arc::new(InMemoryAuditLog::default());
    let processor = Arc::new(BatchProcessor::new(
        queue.clone(),
        repository.clone(),
        sink.clone(),
        Arc::new(facts),
        audit.clone(),
        policy,
        fast_settings(),
    ));
    PipelineHarness {
        processor,
        queue,
        repository,
        sink,
        audit,
    }
}

/// Sink that holds each submission until the test releases a permit, so a
/// run can be observed mid-flight.
pub(super) struct GatedSink {
    inner: RecordingSubmissionSink,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl SubmissionSink for GatedSink {
    async fn submit(
        &self,
        package: &ApplicationPackage,
        job_id: &JobId,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        self.inner.submit(package, job_id).await
    }
}

pub(super) type GatedProcessor = BatchProcessor<
    InMemoryApplyQueue,
    InMemoryApplicationRepository,
    GatedSink,
    InMemoryFactStore,
>;

pub(super) struct GatedHarness {
    pub(super) processor: Arc<GatedProcessor>,
    pub(super) queue: Arc<InMemoryApplyQueue>,
    pub(super) repository: Arc<InMemoryApplicationRepository>,
    pub(super) gate: Arc<Semaphore>,
}

pub(super) fn gated_harness(policy: PolicyConfig, settings: BatchSettings) -> GatedHarness {
    let queue = Arc::new(InMemoryApplyQueue::default());
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let gate = Arc::new(Semaphore::new(0));
    let sink = Arc::new(GatedSink {
        inner: RecordingSubmissionSink::default(),
        gate: gate.clone(),
    });
    let audit = Arc::new(InMemoryAuditLog::default());
    let processor = Arc::new(BatchProcessor::new(
        queue.clone(),
        repository.clone(),
        sink,
        Arc::new(InMemoryFactStore::with_profile(profile(), bullet_bank())),
        audit,
        policy,
        settings,
    ));
    GatedHarness {
        processor,
        queue,
        repository,
        gate,
    }
}

pub(super) async fn wait_for(description: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {description}");
}

pub(super) fn application_for_job(
    repository: &InMemoryApplicationRepository,
    job_id: &str,
) -> Application {
    repository
        .list()
        .expect("repository lists")
        .into_iter()
        .find(|application| application.job_id().0 == job_id)
        .expect("application recorded for job")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

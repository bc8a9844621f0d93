//! Integration scenarios for the autonomous application pipeline.
//!
//! Each scenario drives a full batch run through the public processor and
//! HTTP router, checking the policy gate, grounded assembly, audit trail,
//! and run accounting together rather than module by module.

mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use apply_pilot::config::BatchSettings;
    use apply_pilot::pipeline::memory::{
        InMemoryApplicationRepository, InMemoryApplyQueue, InMemoryAuditLog, InMemoryFactStore,
        RecordingSubmissionSink,
    };
    use apply_pilot::pipeline::{
        BatchProcessor, BulletEntry, CandidateProfile, ExperienceFact, JobId, JobPosting,
        MatchBreakdown, PolicyConfig, QueuedJob,
    };

    pub(super) type Processor = BatchProcessor<
        InMemoryApplyQueue,
        InMemoryApplicationRepository,
        RecordingSubmissionSink,
        InMemoryFactStore,
    >;

    pub(super) struct Pipeline {
        pub(super) processor: Arc<Processor>,
        pub(super) queue: Arc<InMemoryApplyQueue>,
        pub(super) repository: Arc<InMemoryApplicationRepository>,
        pub(super) sink: Arc<RecordingSubmissionSink>,
        pub(super) audit: Arc<InMemoryAuditLog>,
    }

    pub(super) fn pipeline(policy: PolicyConfig) -> Pipeline {
        let queue = Arc::new(InMemoryApplyQueue::default());
        let repository = Arc::new(InMemoryApplicationRepository::default());
        let sink = Arc::new(RecordingSubmissionSink::default());
        let audit = Arc::new(InMemoryAuditLog::default());
        let facts = Arc::new(InMemoryFactStore::with_profile(profile(), bullet_bank()));
        let processor = Arc::new(BatchProcessor::new(
            queue.clone(),
            repository.clone(),
            sink.clone(),
            facts,
            audit.clone(),
            policy,
            BatchSettings {
                pacing_min: Duration::ZERO,
                pacing_max: Duration::ZERO,
                lease_timeout: Duration::from_secs(60),
            },
        ));
        Pipeline {
            processor,
            queue,
            repository,
            sink,
            audit,
        }
    }

    pub(super) fn profile() -> CandidateProfile {
        CandidateProfile {
            name: "Dana Osei".to_string(),
            email: "dana@example.com".to_string(),
            phone: "+1-555-0100".to_string(),
            skills: vec![
                "Rust".to_string(),
                "Kubernetes".to_string(),
                "PostgreSQL".to_string(),
            ],
            experience: vec![ExperienceFact {
                company: "Initech".to_string(),
                title: "Backend Engineer".to_string(),
                bullets: vec![
                    "Built the billing service in Rust".to_string(),
                    "Cut p99 latency by 35% for the checkout service".to_string(),
                ],
            }],
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
                text: "Ran the Kubernetes migration for the payments stack".to_string(),
            },
        ]
    }

    pub(super) fn ranked_job(id: &str, company: &str, score: f32) -> QueuedJob {
        QueuedJob {
            job: JobPosting {
                id: JobId(id.to_string()),
                company: company.to_string(),
                title: "Platform Engineer".to_string(),
                location: "Remote".to_string(),
                description: "Rust services on a Kubernetes platform.".to_string(),
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
}

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use apply_pilot::pipeline::{
    pipeline_router, ApplicationRepository, ApplicationStatus, ApplyQueue, AuditEventType,
    AuditLog, PolicyConfig, PolicyUpdate,
};

use common::{pipeline, ranked_job};

#[tokio::test]
async fn batch_run_applies_policy_assembles_and_audits() {
    let pipeline = pipeline(PolicyConfig {
        blocked_companies: vec!["Acme".to_string()],
        min_match_score: 60.0,
        ..PolicyConfig::default()
    });
    pipeline
        .queue
        .enqueue(vec![
            ranked_job("job-a", "Globex", 75.0),
            ranked_job("job-b", "Acme Inc", 40.0),
        ])
        .expect("enqueue");

    pipeline
        .processor
        .run_until_idle()
        .await
        .expect("run completes");

    let applications = pipeline.repository.list().expect("list");
    assert_eq!(applications.len(), 2);

    let submitted = applications
        .iter()
        .find(|application| application.company() == "Globex")
        .expect("globex record");
    assert_eq!(submitted.status, ApplicationStatus::Submitted);
    assert!(submitted.receipt_id.is_some());

    // The submitted package only contains content grounded in the
    // candidate's verified history.
    let packages = pipeline.sink.submissions();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].applicant_name, "Dana Osei");
    assert!(packages[0].cover_letter.contains("Globex"));
    for section in &packages[0].sections {
        assert_eq!(section.company, "Initech");
    }

    let skipped = applications
        .iter()
        .find(|application| application.company() == "Acme Inc")
        .expect("acme record");
    assert_eq!(skipped.status, ApplicationStatus::PolicySkipped);
    assert!(skipped.notes.contains("blocklisted company"));

    // Every pipeline step left a trace for the submitted application.
    let events = pipeline.audit.read(&submitted.id);
    for expected in [
        AuditEventType::PolicyCheck,
        AuditEventType::Snapshot,
        AuditEventType::Generation,
        AuditEventType::Verification,
        AuditEventType::Submission,
    ] {
        assert!(
            events.iter().any(|event| event.event_type == expected),
            "missing {expected:?} event"
        );
    }

    let status = pipeline.processor.status();
    assert_eq!(status.phase, "idle");
    assert_eq!(status.processed, 2);
    assert_eq!(status.succeeded, 1);
    assert_eq!(status.skipped, 1);
}

#[tokio::test]
async fn kill_switch_flipped_through_the_api_halts_the_next_run() {
    let pipeline = pipeline(PolicyConfig {
        min_match_score: 0.0,
        ..PolicyConfig::default()
    });
    pipeline
        .queue
        .enqueue(vec![ranked_job("job-a", "Globex", 75.0)])
        .expect("enqueue");

    let router = pipeline_router(pipeline.processor.clone());
    let response = router
        .oneshot(
            Request::put("/api/v1/pipeline/policy")
                .header("content-type", "application/json")
                .body(Body::from(r#"{ "kill_switch": true }"#))
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    pipeline
        .processor
        .run_until_idle()
        .await
        .expect("run completes");

    // The blocked job was never consumed and nothing reached the portal.
    assert_eq!(pipeline.queue.list().expect("list").len(), 1);
    assert!(pipeline.sink.submissions().is_empty());
    assert_eq!(pipeline.processor.status().processed, 0);

    // Lifting the switch lets the same queue drain normally.
    pipeline.processor.update_policy(PolicyUpdate {
        kill_switch: Some(false),
        ..PolicyUpdate::default()
    });
    pipeline
        .processor
        .run_until_idle()
        .await
        .expect("second run completes");
    assert!(pipeline.queue.list().expect("list").is_empty());
    assert_eq!(pipeline.sink.submissions().len(), 1);
}

#[tokio::test]
async fn failed_submission_is_retryable_end_to_end() {
    use apply_pilot::pipeline::SubmissionError;

    let pipeline = pipeline(PolicyConfig {
        min_match_score: 0.0,
        ..PolicyConfig::default()
    });
    pipeline
        .sink
        .push_outcome(Err(SubmissionError::Rejected {
            status: 503,
            message: "portal maintenance".to_string(),
        }));
    pipeline
        .queue
        .enqueue(vec![ranked_job("job-a", "Globex", 75.0)])
        .expect("enqueue");

    pipeline
        .processor
        .run_until_idle()
        .await
        .expect("run completes");

    let failed = pipeline.repository.list().expect("list").remove(0);
    assert_eq!(failed.status, ApplicationStatus::Failed);
    assert!(failed
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("portal maintenance"));

    let view = pipeline.processor.retry(&failed.id).expect("retry accepted");
    assert_eq!(view.status, "queued");

    pipeline
        .processor
        .run_until_idle()
        .await
        .expect("retry run completes");

    let retried = pipeline
        .repository
        .fetch(&failed.id)
        .expect("fetch")
        .expect("record");
    assert_eq!(retried.status, ApplicationStatus::Submitted);
    assert!(retried.receipt_id.is_some());

    // One trail across both attempts, strictly appended.
    let events = pipeline.audit.read(&failed.id);
    assert!(events
        .iter()
        .any(|event| event.step == "retry requested"));
    assert!(events.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

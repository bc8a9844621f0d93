use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;

use apply_pilot::pipeline::{
    BulletEntry, CandidateProfile, ExperienceFact, JobId, JobPosting, MatchBreakdown, QueuedJob,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Candidate facts used by `serve --seed` and the CLI demo. Everything a
/// generated package may claim has to originate here.
pub(crate) fn demo_profile() -> CandidateProfile {
    CandidateProfile {
        name: "Dana Osei".to_string(),
        email: "dana.osei@example.com".to_string(),
        phone: "+1-555-0100".to_string(),
        skills: vec![
            "Rust".to_string(),
            "Python".to_string(),
            "Kubernetes".to_string(),
            "PostgreSQL".to_string(),
            "AWS".to_string(),
        ],
        experience: vec![
            ExperienceFact {
                company: "Initech".to_string(),
                title: "Senior Backend Engineer".to_string(),
                bullets: vec![
                    "Built the billing service in Rust".to_string(),
                    "Cut p99 latency by 35% for the checkout service".to_string(),
                    "Led the migration from MySQL to PostgreSQL".to_string(),
                ],
            },
            ExperienceFact {
                company: "Hooli".to_string(),
                title: "Platform Engineer".to_string(),
                bullets: vec![
                    "Ran Kubernetes clusters for forty internal teams".to_string(),
                    "Automated AWS cost reporting with Python".to_string(),
                ],
            },
        ],
    }
}

pub(crate) fn demo_bullet_bank() -> Vec<BulletEntry> {
    let entries = [
        ("Initech", "Built the billing service in Rust"),
        ("Initech", "Cut p99 latency by 35% for the checkout service"),
        ("Initech", "Led the migration from MySQL to PostgreSQL"),
        ("Initech", "Shipped a usage metering pipeline on Kafka"),
        ("Hooli", "Ran Kubernetes clusters for forty internal teams"),
        ("Hooli", "Automated AWS cost reporting with Python"),
        ("Hooli", "Cut cluster upgrade downtime to under five minutes"),
    ];
    entries
        .into_iter()
        .map(|(company, text)| BulletEntry {
            source_company: company.to_string(),
            text: text.to_string(),
        })
        .collect()
}

/// Ranked listings as the upstream matcher would hand them over, highest
/// score first.
pub(crate) fn demo_jobs() -> Vec<QueuedJob> {
    let listings = [
        ("job-globex-platform", "Globex", "Platform Engineer", true, 82.0),
        ("job-initrode-backend", "Initrode", "Backend Engineer", true, 74.0),
        ("job-acme-sre", "Acme Inc", "Site Reliability Engineer", true, 68.0),
        ("job-umbrella-onsite", "Umbrella Corp", "Infrastructure Engineer", false, 66.0),
        ("job-vandelay-junior", "Vandelay Industries", "Junior Developer", true, 41.0),
    ];
    listings
        .into_iter()
        .map(|(id, company, title, remote, score)| {
            let location = if remote { "Remote" } else { "On-site" };
            QueuedJob {
            job: JobPosting {
                id: JobId(id.to_string()),
                company: company.to_string(),
                title: title.to_string(),
                location: location.to_string(),
                description: format!(
                    "{company} is hiring a {title} to work on Rust services, \
                     Kubernetes infrastructure, and PostgreSQL-backed systems."
                ),
                skills_required: vec![
                    "Rust".to_string(),
                    "Kubernetes".to_string(),
                    "PostgreSQL".to_string(),
                ],
                remote,
                url: Some(format!("https://jobs.example.com/{id}")),
            },
            match_score: score,
            breakdown: MatchBreakdown {
                skills: score,
                experience: score - 5.0,
                constraints: if remote { 100.0 } else { 40.0 },
            },
            queued_at: Utc::now(),
            rank: 0,
        }
        })
        .collect()
}

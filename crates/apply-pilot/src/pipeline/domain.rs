use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a job listing as assigned by the ranking producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one application attempt tracked by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job listing attributes the pipeline reads. Scores are computed upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: JobId,
    pub company: String,
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills_required: Vec<String>,
    #[serde(default)]
    pub remote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Sub-scores produced by the ranking producer alongside the overall match.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchBreakdown {
    pub skills: f32,
    pub experience: f32,
    pub constraints: f32,
}

/// Queue entry: a posting plus its computed match score and mutable rank.
///
/// Ranks are a contiguous `1..=len` ordering maintained by the queue; the
/// queue is a sequence, not a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job: JobPosting,
    pub match_score: f32,
    #[serde(default)]
    pub breakdown: MatchBreakdown,
    pub queued_at: DateTime<Utc>,
    pub rank: u32,
}

/// Lifecycle of one application attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Queued,
    Assembling,
    Verifying,
    Submitting,
    Submitted,
    Failed,
    PolicySkipped,
}

impl ApplicationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::Queued => "queued",
            ApplicationStatus::Assembling => "assembling",
            ApplicationStatus::Verifying => "verifying",
            ApplicationStatus::Submitting => "submitting",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Failed => "failed",
            ApplicationStatus::PolicySkipped => "policy_skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted
                | ApplicationStatus::Failed
                | ApplicationStatus::PolicySkipped
        )
    }

    /// Forward transitions only. `Failed` is reachable from every
    /// non-terminal state; the `failed -> queued` reset is the explicit
    /// retry path on [`Application::reset_for_retry`], not an advance.
    pub fn can_advance_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        match (self, next) {
            (Queued, Assembling) | (Queued, PolicySkipped) => true,
            (Assembling, Verifying) => true,
            (Verifying, Submitting) => true,
            (Submitting, Submitted) => true,
            (Queued, Failed) | (Assembling, Failed) | (Verifying, Failed)
            | (Submitting, Failed) => true,
            _ => false,
        }
    }
}

/// One record per job the pipeline has attempted.
///
/// The queued-job snapshot is retained so a retry can re-enqueue the job
/// with its original score and breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub queued: QueuedJob,
    pub status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_letter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(id: ApplicationId, queued: QueuedJob) -> Self {
        let now = Utc::now();
        Self {
            id,
            queued,
            status: ApplicationStatus::Queued,
            resume_text: None,
            cover_letter: None,
            submitted_at: None,
            receipt_id: None,
            failure_reason: None,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.queued.job.id
    }

    pub fn company(&self) -> &str {
        &self.queued.job.company
    }

    pub fn title(&self) -> &str {
        &self.queued.job.title
    }

    /// Advance to `next`, rejecting backward or skipping transitions.
    pub fn advance(&mut self, next: ApplicationStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_advance_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn append_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
        self.updated_at = Utc::now();
    }

    /// Explicit user-driven retry: `failed -> queued`, clearing failure
    /// metadata. Prior audit events are untouched by design; only the
    /// mutable record resets.
    pub fn reset_for_retry(&mut self) -> Result<(), InvalidTransition> {
        if self.status != ApplicationStatus::Failed {
            return Err(InvalidTransition {
                from: self.status,
                to: ApplicationStatus::Queued,
            });
        }
        self.status = ApplicationStatus::Queued;
        self.failure_reason = None;
        self.receipt_id = None;
        self.submitted_at = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            job_id: self.queued.job.id.clone(),
            company: self.queued.job.company.clone(),
            title: self.queued.job.title.clone(),
            status: self.status.label(),
            match_score: self.queued.match_score,
            submitted_at: self.submitted_at,
            receipt_id: self.receipt_id.clone(),
            failure_reason: self.failure_reason.clone(),
            retryable: self.status == ApplicationStatus::Failed,
        }
    }
}

/// Attempted transition that would move an application backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid status transition {} -> {}", from.label(), to.label())]
pub struct InvalidTransition {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

/// Sanitized per-application view for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub job_id: JobId,
    pub company: String,
    pub title: String,
    pub status: &'static str,
    pub match_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub retryable: bool,
}

/// One employment entry from the candidate's verified history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceFact {
    pub company: String,
    pub title: String,
    #[serde(default)]
    pub bullets: Vec<String>,
}

/// Read-only candidate facts served by the fact store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceFact>,
}

/// One entry of the pre-written bullet bank, tied to its source employer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletEntry {
    pub source_company: String,
    pub text: String,
}

/// Resume body for one employment entry after tailoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeSection {
    pub company: String,
    pub title: String,
    pub bullets: Vec<String>,
}

/// Fully assembled, verified application package ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPackage {
    pub application_id: ApplicationId,
    pub job_id: JobId,
    pub applicant_name: String,
    pub applicant_email: String,
    pub sections: Vec<ResumeSection>,
    pub cover_letter: String,
    pub assembled_at: DateTime<Utc>,
}

impl ApplicationPackage {
    /// Flatten the tailored sections into the single resume text the
    /// portal accepts.
    pub fn resume_text(&self) -> String {
        let mut lines = Vec::new();
        for section in &self.sections {
            lines.push(format!("--- {} | {} ---", section.company, section.title));
            for bullet in &section.bullets {
                lines.push(format!("- {bullet}"));
            }
        }
        lines.join("\n")
    }
}

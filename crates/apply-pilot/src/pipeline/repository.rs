use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationPackage, BulletEntry, CandidateProfile, JobId,
    QueuedJob,
};

/// Priority-ordered apply queue. Every mutation leaves ranks as a
/// contiguous `1..=len` sequence with no duplicates.
pub trait ApplyQueue: Send + Sync {
    /// Append jobs at the back of the queue, ignoring ids already queued.
    /// Returns how many were added.
    fn enqueue(&self, jobs: Vec<QueuedJob>) -> Result<usize, QueueError>;

    /// Remove and return the highest-priority entry (lowest rank).
    fn pop_highest(&self) -> Result<Option<QueuedJob>, QueueError>;

    /// Put a just-dequeued entry back at the front of the queue, leaving
    /// the ordering as it was before the dequeue. Used when a policy block
    /// ends the run without consuming the job.
    fn restore(&self, job: QueuedJob) -> Result<(), QueueError>;

    fn list(&self) -> Result<Vec<QueuedJob>, QueueError>;

    fn remove(&self, job_id: &JobId) -> Result<bool, QueueError>;

    /// Reorder to match `job_ids`; entries not listed keep their relative
    /// order after the listed ones. Unknown ids are an error.
    fn reorder(&self, job_ids: &[JobId]) -> Result<Vec<QueuedJob>, QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job '{0}' is not in the queue")]
    UnknownJob(JobId),
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for application records so the processor and
/// tracker can be exercised in isolation.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    fn update(&self, application: Application) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    /// The non-terminal application for a job, if one exists. Used so a
    /// blocked job reuses its record instead of spawning a duplicate.
    fn find_active_by_job(&self, job_id: &JobId) -> Result<Option<Application>, RepositoryError>;
    fn list(&self) -> Result<Vec<Application>, RepositoryError>;
    /// Count of applications submitted at or after `since`. Backs the
    /// trailing-24h daily limit.
    fn submitted_since(&self, since: DateTime<Utc>) -> Result<u32, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Receipt returned by the external portal on a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub receipt_id: String,
}

/// Opaque, possibly-slow, possibly-failing submission boundary. The
/// pipeline never retries on its own; retry is an explicit user action.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(
        &self,
        package: &ApplicationPackage,
        job_id: &JobId,
    ) -> Result<SubmissionReceipt, SubmissionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("portal timed out")]
    Timeout,
    #[error("portal rejected the submission ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Read-only access to the candidate's verified facts and bullet bank.
pub trait FactStore: Send + Sync {
    fn profile(&self) -> Option<CandidateProfile>;
    fn bullet_bank(&self) -> Vec<BulletEntry>;
}

//! In-memory reference adapters for the pipeline's external seams. They
//! back the API service's default wiring, the CLI demo, and the tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::audit::{AuditEvent, AuditEventType, AuditLog};
use super::domain::{
    Application, ApplicationId, ApplicationPackage, BulletEntry, CandidateProfile, JobId,
    QueuedJob,
};
use super::repository::{
    ApplicationRepository, ApplyQueue, FactStore, QueueError, RepositoryError, SubmissionError,
    SubmissionReceipt, SubmissionSink,
};

#[derive(Default, Clone)]
pub struct InMemoryApplyQueue {
    entries: Arc<Mutex<Vec<QueuedJob>>>,
}

impl InMemoryApplyQueue {
    fn renumber(entries: &mut [QueuedJob]) {
        for (index, entry) in entries.iter_mut().enumerate() {
            entry.rank = index as u32 + 1;
        }
    }
}

impl ApplyQueue for InMemoryApplyQueue {
    fn enqueue(&self, jobs: Vec<QueuedJob>) -> Result<usize, QueueError> {
        let mut guard = self.entries.lock().expect("queue mutex poisoned");
        let mut added = 0;
        for job in jobs {
            if guard.iter().any(|entry| entry.job.id == job.job.id) {
                continue;
            }
            guard.push(job);
            added += 1;
        }
        Self::renumber(&mut guard);
        Ok(added)
    }

    fn pop_highest(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut guard = self.entries.lock().expect("queue mutex poisoned");
        if guard.is_empty() {
            return Ok(None);
        }
        let job = guard.remove(0);
        Self::renumber(&mut guard);
        Ok(Some(job))
    }

    fn restore(&self, job: QueuedJob) -> Result<(), QueueError> {
        let mut guard = self.entries.lock().expect("queue mutex poisoned");
        guard.insert(0, job);
        Self::renumber(&mut guard);
        Ok(())
    }

    fn list(&self) -> Result<Vec<QueuedJob>, QueueError> {
        let guard = self.entries.lock().expect("queue mutex poisoned");
        Ok(guard.clone())
    }

    fn remove(&self, job_id: &JobId) -> Result<bool, QueueError> {
        let mut guard = self.entries.lock().expect("queue mutex poisoned");
        let before = guard.len();
        guard.retain(|entry| &entry.job.id != job_id);
        let removed = guard.len() != before;
        Self::renumber(&mut guard);
        Ok(removed)
    }

    fn reorder(&self, job_ids: &[JobId]) -> Result<Vec<QueuedJob>, QueueError> {
        let mut guard = self.entries.lock().expect("queue mutex poisoned");
        for id in job_ids {
            if !guard.iter().any(|entry| &entry.job.id == id) {
                return Err(QueueError::UnknownJob(id.clone()));
            }
        }

        let mut remaining: VecDeque<QueuedJob> = guard.drain(..).collect();
        let mut reordered = Vec::with_capacity(remaining.len());
        for id in job_ids {
            if let Some(position) = remaining.iter().position(|entry| &entry.job.id == id) {
                reordered.push(remaining.remove(position).expect("position valid"));
            }
        }
        reordered.extend(remaining);
        Self::renumber(&mut reordered);
        *guard = reordered.clone();
        Ok(reordered)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update(&self, application: Application) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&application.id) {
            guard.insert(application.id.clone(), application);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_active_by_job(&self, job_id: &JobId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|application| application.job_id() == job_id && !application.status.is_terminal())
            .cloned())
    }

    fn list(&self) -> Result<Vec<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut applications: Vec<Application> = guard.values().cloned().collect();
        applications.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(applications)
    }

    fn submitted_since(&self, since: DateTime<Utc>) -> Result<u32, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|application| {
                application
                    .submitted_at
                    .map(|at| at >= since)
                    .unwrap_or(false)
            })
            .count() as u32)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAuditLog {
    events: Arc<Mutex<HashMap<ApplicationId, Vec<AuditEvent>>>>,
}

impl AuditLog for InMemoryAuditLog {
    fn record(
        &self,
        application_id: &ApplicationId,
        event_type: AuditEventType,
        step: &str,
        details: Value,
    ) {
        let mut guard = self.events.lock().expect("audit mutex poisoned");
        guard
            .entry(application_id.clone())
            .or_default()
            .push(AuditEvent::new(event_type, step, details));
    }

    fn read(&self, application_id: &ApplicationId) -> Vec<AuditEvent> {
        let guard = self.events.lock().expect("audit mutex poisoned");
        guard.get(application_id).cloned().unwrap_or_default()
    }
}

#[derive(Default, Clone)]
pub struct InMemoryFactStore {
    profile: Arc<Mutex<Option<CandidateProfile>>>,
    bullets: Arc<Mutex<Vec<BulletEntry>>>,
}

impl InMemoryFactStore {
    pub fn with_profile(profile: CandidateProfile, bullets: Vec<BulletEntry>) -> Self {
        Self {
            profile: Arc::new(Mutex::new(Some(profile))),
            bullets: Arc::new(Mutex::new(bullets)),
        }
    }

    pub fn set_profile(&self, profile: CandidateProfile) {
        *self.profile.lock().expect("fact store mutex poisoned") = Some(profile);
    }

    pub fn set_bullets(&self, bullets: Vec<BulletEntry>) {
        *self.bullets.lock().expect("fact store mutex poisoned") = bullets;
    }
}

impl FactStore for InMemoryFactStore {
    fn profile(&self) -> Option<CandidateProfile> {
        self.profile.lock().expect("fact store mutex poisoned").clone()
    }

    fn bullet_bank(&self) -> Vec<BulletEntry> {
        self.bullets.lock().expect("fact store mutex poisoned").clone()
    }
}

/// Sink that records submitted packages and answers from a script of
/// outcomes (defaulting to success), so runs are reproducible without a
/// live portal.
#[derive(Default, Clone)]
pub struct RecordingSubmissionSink {
    submissions: Arc<Mutex<Vec<ApplicationPackage>>>,
    script: Arc<Mutex<VecDeque<Result<SubmissionReceipt, SubmissionError>>>>,
    counter: Arc<Mutex<u64>>,
}

impl RecordingSubmissionSink {
    pub fn submissions(&self) -> Vec<ApplicationPackage> {
        self.submissions.lock().expect("sink mutex poisoned").clone()
    }

    /// Queue the outcome for the next submission. Unscripted submissions
    /// succeed with a generated receipt.
    pub fn push_outcome(&self, outcome: Result<SubmissionReceipt, SubmissionError>) {
        self.script
            .lock()
            .expect("sink mutex poisoned")
            .push_back(outcome);
    }
}

#[async_trait]
impl SubmissionSink for RecordingSubmissionSink {
    async fn submit(
        &self,
        package: &ApplicationPackage,
        _job_id: &JobId,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        self.submissions
            .lock()
            .expect("sink mutex poisoned")
            .push(package.clone());

        if let Some(outcome) = self.script.lock().expect("sink mutex poisoned").pop_front() {
            return outcome;
        }

        let mut counter = self.counter.lock().expect("sink mutex poisoned");
        *counter += 1;
        Ok(SubmissionReceipt {
            receipt_id: format!("receipt-{:06}", *counter),
        })
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::audit::{AuditEvent, AuditEventType};
use super::domain::{Application, ApplicationId, ApplicationStatus, ApplicationStatusView};
use super::processor::{BatchProcessor, PipelineError};
use super::repository::{ApplicationRepository, ApplyQueue, FactStore, SubmissionSink};

/// High-level statistics for the tracking dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerSummary {
    pub total_applications: usize,
    /// submitted / (submitted + failed), as a percentage.
    pub success_rate: f32,
    pub submitted_count: usize,
    pub failed_count: usize,
    pub status_breakdown: BTreeMap<&'static str, usize>,
    pub recent_activity: Vec<ApplicationStatusView>,
}

/// Filters for the application listing; all optional, combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
    /// Case-insensitive substring match on the company name.
    pub company: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

const DEFAULT_LIST_LIMIT: usize = 100;
const RECENT_ACTIVITY_LIMIT: usize = 5;

impl<Q, R, S, F> BatchProcessor<Q, R, S, F>
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    pub fn tracker_summary(&self) -> Result<TrackerSummary, PipelineError> {
        let applications = self.repository().list()?;

        let mut breakdown: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut submitted_count = 0;
        let mut failed_count = 0;
        for application in &applications {
            *breakdown.entry(application.status.label()).or_insert(0) += 1;
            match application.status {
                ApplicationStatus::Submitted => submitted_count += 1,
                ApplicationStatus::Failed => failed_count += 1,
                _ => {}
            }
        }

        let denominator = submitted_count + failed_count;
        let success_rate = if denominator > 0 {
            (submitted_count as f32 / denominator as f32 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        let recent_activity = applications
            .iter()
            .take(RECENT_ACTIVITY_LIMIT)
            .map(Application::status_view)
            .collect();

        Ok(TrackerSummary {
            total_applications: applications.len(),
            success_rate,
            submitted_count,
            failed_count,
            status_breakdown: breakdown,
            recent_activity,
        })
    }

    /// Applications matching the filter, most recently updated first.
    pub fn applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<ApplicationStatusView>, PipelineError> {
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let company_needle = filter.company.as_ref().map(|c| c.to_lowercase());

        let views = self
            .repository()
            .list()?
            .into_iter()
            .filter(|application| {
                if let Some(status) = filter.status {
                    if application.status != status {
                        return false;
                    }
                }
                if let Some(needle) = &company_needle {
                    if !application.company().to_lowercase().contains(needle) {
                        return false;
                    }
                }
                let reference = application.submitted_at.unwrap_or(application.updated_at);
                if let Some(from) = filter.date_from {
                    if reference < from {
                        return false;
                    }
                }
                if let Some(to) = filter.date_to {
                    if reference > to {
                        return false;
                    }
                }
                true
            })
            .take(limit)
            .map(|application| application.status_view())
            .collect();
        Ok(views)
    }

    pub fn failed_applications(&self) -> Result<Vec<ApplicationStatusView>, PipelineError> {
        self.applications(&ApplicationFilter {
            status: Some(ApplicationStatus::Failed),
            ..ApplicationFilter::default()
        })
    }

    pub fn application(&self, id: &ApplicationId) -> Result<Application, PipelineError> {
        self.repository()
            .fetch(id)?
            .ok_or(PipelineError::ApplicationNotFound)
    }

    pub fn audit_trail(&self, id: &ApplicationId) -> Result<Vec<AuditEvent>, PipelineError> {
        // The trail exists only for applications we have attempted.
        let _ = self.application(id)?;
        Ok(self.audit_log().read(id))
    }

    /// Explicit user retry of a failed application: clears failure
    /// metadata, resets to `queued`, re-enqueues the original job
    /// snapshot at the back of the queue, and appends to (never rewrites)
    /// the audit history.
    pub fn retry(&self, id: &ApplicationId) -> Result<ApplicationStatusView, PipelineError> {
        let mut application = self.application(id)?;
        if application.status != ApplicationStatus::Failed {
            return Err(PipelineError::NotRetryable(application.status));
        }
        let previous_failure = application.failure_reason.clone();

        self.audit_log().record(
            id,
            AuditEventType::Snapshot,
            "retry requested",
            json!({ "previous_failure": previous_failure }),
        );

        application
            .reset_for_retry()
            .map_err(|err| PipelineError::NotRetryable(err.from))?;
        application.append_note("retry requested by user");
        self.repository().update(application.clone())?;

        let mut job = application.queued.clone();
        job.queued_at = Utc::now();
        self.queue().enqueue(vec![job])?;

        Ok(application.status_view())
    }
}

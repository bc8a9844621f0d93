use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::BatchSettings;

use super::assembler::{AssemblyError, JobContext, PackageAssembler};
use super::audit::{AuditEventType, AuditLog};
use super::domain::{
    Application, ApplicationId, ApplicationStatus, InvalidTransition, JobId, QueuedJob,
};
use super::policy::{self, BlockReason, PolicyConfig, PolicyCounters, PolicyDecision, PolicyUpdate};
use super::repository::{
    ApplicationRepository, ApplyQueue, FactStore, QueueError, RepositoryError, SubmissionSink,
};
use super::state::{BatchRunState, BatchStatusView};

/// Error raised by the pipeline's control operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("batch run already in progress")]
    AlreadyRunning,
    #[error("no batch run in progress")]
    NotRunning,
    #[error("application not found")]
    ApplicationNotFound,
    #[error("application cannot be retried from status '{}'", .0.label())]
    NotRetryable(ApplicationStatus),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Terminal outcome of one dequeued job within a run.
#[derive(Debug, Clone)]
enum JobOutcome {
    Submitted,
    Skipped(String),
    Failed(String),
    Blocked(BlockReason),
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Scheduler and state machine draining the apply queue.
///
/// A single background task per process drives the loop; mutual exclusion
/// is enforced with an atomic `idle -> running` claim guarded by a
/// heartbeat lease so an uncleanly terminated run can be reclaimed. Each
/// claim bumps the state's run epoch; a loop whose captured epoch no
/// longer matches has been superseded by a reclaim and stands down
/// without touching counters or phase.
pub struct BatchProcessor<Q, R, S, F> {
    queue: Arc<Q>,
    repository: Arc<R>,
    sink: Arc<S>,
    facts: Arc<F>,
    audit: Arc<dyn AuditLog>,
    assembler: PackageAssembler,
    policy: RwLock<PolicyConfig>,
    settings: BatchSettings,
    state: Mutex<BatchRunState>,
}

impl<Q, R, S, F> BatchProcessor<Q, R, S, F>
where
    Q: ApplyQueue + 'static,
    R: ApplicationRepository + 'static,
    S: SubmissionSink + 'static,
    F: FactStore + 'static,
{
    pub fn new(
        queue: Arc<Q>,
        repository: Arc<R>,
        sink: Arc<S>,
        facts: Arc<F>,
        audit: Arc<dyn AuditLog>,
        policy: PolicyConfig,
        settings: BatchSettings,
    ) -> Self {
        Self {
            queue,
            repository,
            sink,
            facts,
            audit,
            assembler: PackageAssembler,
            policy: RwLock::new(policy),
            settings,
            state: Mutex::new(BatchRunState::default()),
        }
    }

    // ---- control surface -------------------------------------------------

    /// Atomically claim the run slot and spawn the background loop.
    /// Rejects with [`PipelineError::AlreadyRunning`] while a live run
    /// holds the slot; a run whose heartbeat lease has expired is
    /// reclaimed instead.
    pub fn start(self: &Arc<Self>) -> Result<(), PipelineError> {
        let epoch = self.claim_run()?;
        let processor = Arc::clone(self);
        tokio::spawn(async move {
            processor.run_loop(epoch).await;
        });
        Ok(())
    }

    /// Claim the run slot and drive the loop on the current task. Used by
    /// the CLI demo and tests; subject to the same mutual exclusion as
    /// [`Self::start`].
    pub async fn run_until_idle(self: &Arc<Self>) -> Result<(), PipelineError> {
        let epoch = self.claim_run()?;
        self.run_loop(epoch).await;
        Ok(())
    }

    /// Cooperative stop: the job currently mid-flight finishes first.
    pub fn stop(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().expect("run state mutex poisoned");
        match state.phase {
            super::state::RunPhase::Running => {
                state.phase = super::state::RunPhase::Stopping;
                state.log("stop requested by user");
                Ok(())
            }
            super::state::RunPhase::Stopping => Ok(()),
            super::state::RunPhase::Idle => Err(PipelineError::NotRunning),
        }
    }

    pub fn status(&self) -> BatchStatusView {
        self.state
            .lock()
            .expect("run state mutex poisoned")
            .snapshot()
    }

    pub fn policy(&self) -> PolicyConfig {
        self.policy.read().expect("policy lock poisoned").clone()
    }

    pub fn update_policy(&self, update: PolicyUpdate) -> PolicyConfig {
        let mut guard = self.policy.write().expect("policy lock poisoned");
        guard.apply(update);
        info!("application policy updated");
        guard.clone()
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn audit_log(&self) -> &dyn AuditLog {
        self.audit.as_ref()
    }

    /// Returns the epoch of the claimed run; the loop carries it so a
    /// later reclaim can tell it to stand down.
    fn claim_run(&self) -> Result<u64, PipelineError> {
        let mut state = self.state.lock().expect("run state mutex poisoned");
        if state.phase != super::state::RunPhase::Idle {
            let timeout = chrono::Duration::from_std(self.settings.lease_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
            if !state.lease_expired(timeout) {
                return Err(PipelineError::AlreadyRunning);
            }
            warn!("reclaiming batch run slot with an expired heartbeat lease");
            state.log("previous run lease expired; reclaiming run slot");
            state.finish_run();
        }
        state.begin_run();
        state.log("batch run started");
        Ok(state.epoch)
    }

    // ---- batch loop ------------------------------------------------------

    async fn run_loop(self: &Arc<Self>, epoch: u64) {
        loop {
            {
                let mut state = self.state.lock().expect("run state mutex poisoned");
                if state.epoch != epoch {
                    // Superseded by a lease reclaim; the state now belongs
                    // to the replacement run.
                    return;
                }
                state.heartbeat();
                if state.phase == super::state::RunPhase::Stopping {
                    state.log("batch stopped before next job");
                    break;
                }
            }

            let job = match self.queue.pop_highest() {
                Ok(Some(job)) => job,
                Ok(None) => {
                    let mut state = self.state.lock().expect("run state mutex poisoned");
                    state.log("queue drained; run complete");
                    break;
                }
                Err(err) => {
                    error!(%err, "failed to read apply queue");
                    let mut state = self.state.lock().expect("run state mutex poisoned");
                    state.log(format!("queue unavailable: {err}"));
                    break;
                }
            };

            {
                let mut state = self.state.lock().expect("run state mutex poisoned");
                state.current_job = Some(job.job.id.clone());
                state.log(format!(
                    "processing {} at {} (score {:.0})",
                    job.job.title, job.job.company, job.match_score
                ));
            }

            let outcome = self.process_job(job, epoch).await;

            let blocked = {
                let mut state = self.state.lock().expect("run state mutex poisoned");
                if state.epoch != epoch {
                    // Reclaimed while this job was in flight; the outcome
                    // belongs to no run and must not reach the new one.
                    return;
                }
                state.current_job = None;
                match &outcome {
                    JobOutcome::Submitted => {
                        state.processed += 1;
                        state.succeeded += 1;
                        state.log("submitted successfully");
                        false
                    }
                    JobOutcome::Skipped(reason) => {
                        state.processed += 1;
                        state.skipped += 1;
                        state.log(format!("skipped: {reason}"));
                        false
                    }
                    JobOutcome::Failed(reason) => {
                        state.processed += 1;
                        state.failed += 1;
                        state.log(format!("failed: {reason}"));
                        false
                    }
                    // A block does not consume the job; it stays queued.
                    JobOutcome::Blocked(reason) => {
                        state.log(format!("run blocked: {}", reason.summary()));
                        true
                    }
                }
            };
            if blocked {
                break;
            }

            // Paces submissions to a human-like cadence; also where the
            // loop yields between jobs.
            tokio::time::sleep(self.pacing_delay()).await;
        }

        let mut state = self.state.lock().expect("run state mutex poisoned");
        if state.epoch == epoch {
            state.log("batch run finished");
            state.finish_run();
        }
    }

    /// Refresh the heartbeat from inside a job so a slow portal call does
    /// not make a live run look abandoned. No-op once superseded.
    fn refresh_lease(&self, epoch: u64) {
        let mut state = self.state.lock().expect("run state mutex poisoned");
        if state.epoch == epoch {
            state.heartbeat();
        }
    }

    fn pacing_delay(&self) -> Duration {
        let min = self.settings.pacing_min.as_millis() as u64;
        let max = self.settings.pacing_max.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        let millis = if min >= max {
            max
        } else {
            rand::thread_rng().gen_range(min..=max)
        };
        Duration::from_millis(millis)
    }

    // ---- per-job state machine -------------------------------------------

    async fn process_job(&self, job: QueuedJob, epoch: u64) -> JobOutcome {
        let application = match self.repository.find_active_by_job(&job.job.id) {
            Ok(Some(existing)) => existing,
            Ok(None) => {
                let fresh = Application::new(next_application_id(), job.clone());
                match self.repository.insert(fresh) {
                    Ok(inserted) => inserted,
                    Err(err) => {
                        error!(%err, job = %job.job.id, "could not create application record");
                        return JobOutcome::Failed(format!("repository unavailable: {err}"));
                    }
                }
            }
            Err(err) => {
                error!(%err, job = %job.job.id, "could not look up application record");
                return JobOutcome::Failed(format!("repository unavailable: {err}"));
            }
        };

        let config = self.policy();
        let window_start = Utc::now() - chrono::Duration::hours(24);
        let submitted_last_24h = match self.repository.submitted_since(window_start) {
            Ok(count) => count,
            Err(err) => {
                // Fail open on the counter, matching the policy file-store
                // behavior; the audit record still captures the check.
                warn!(%err, "could not count recent submissions; treating as zero");
                0
            }
        };
        let counters = PolicyCounters { submitted_last_24h };
        let decision = policy::evaluate(&job, &config, &counters);

        self.audit.record(
            &application.id,
            AuditEventType::PolicyCheck,
            "application policy",
            json!({
                "decision": decision.summary(),
                "submitted_last_24h": submitted_last_24h,
                "policy": config,
            }),
        );

        match decision {
            PolicyDecision::Block(reason) => {
                // The job is not consumed: restore it so the queue reads
                // exactly as before this iteration.
                if let Err(err) = self.queue.restore(job) {
                    error!(%err, "failed to restore job after policy block");
                }
                JobOutcome::Blocked(reason)
            }
            PolicyDecision::Skip(reason) => {
                let summary = reason.summary();
                let mut application = application;
                if let Err(err) = application.advance(ApplicationStatus::PolicySkipped) {
                    error!(%err, application = %application.id, "skip transition rejected");
                    return JobOutcome::Failed(err.to_string());
                }
                application.append_note(&format!("skipped by policy: {summary}"));
                self.persist(&application);
                JobOutcome::Skipped(summary)
            }
            PolicyDecision::Allow => self.run_application(application, job, epoch).await,
        }
    }

    async fn run_application(
        &self,
        mut application: Application,
        job: QueuedJob,
        epoch: u64,
    ) -> JobOutcome {
        // Assembling.
        if let Err(err) = self.transition(&mut application, ApplicationStatus::Assembling) {
            return self.mark_failed(application, err.to_string());
        }

        let Some(profile) = self.facts.profile() else {
            let reason = AssemblyError::MissingProfile.to_string();
            self.audit.record(
                &application.id,
                AuditEventType::Generation,
                "package assembly",
                json!({ "status": "failed", "error": reason }),
            );
            return self.mark_failed(application, reason);
        };
        let ctx = JobContext::build(job.job.clone(), profile, self.facts.bullet_bank());

        let draft = match self
            .assembler
            .draft(&ctx, self.audit.as_ref(), &application.id)
        {
            Ok(draft) => draft,
            Err(err) => {
                let reason = err.to_string();
                self.audit.record(
                    &application.id,
                    AuditEventType::Generation,
                    "package assembly",
                    json!({ "status": "failed", "error": reason }),
                );
                return self.mark_failed(application, reason);
            }
        };

        // Verifying.
        if let Err(err) = self.transition(&mut application, ApplicationStatus::Verifying) {
            return self.mark_failed(application, err.to_string());
        }
        let package = self
            .assembler
            .finalize(&ctx, draft, self.audit.as_ref(), &application.id);
        application.resume_text = Some(package.resume_text());
        application.cover_letter = Some(package.cover_letter.clone());

        // Submitting.
        if let Err(err) = self.transition(&mut application, ApplicationStatus::Submitting) {
            return self.mark_failed(application, err.to_string());
        }

        // Everything before this point is quick; the portal call is the
        // one await that can outlast the lease.
        self.refresh_lease(epoch);
        let submitted = self.sink.submit(&package, &job.job.id).await;
        self.refresh_lease(epoch);

        match submitted {
            Ok(receipt) => {
                self.audit.record(
                    &application.id,
                    AuditEventType::Submission,
                    "final submission",
                    json!({ "status": "success", "receipt_id": receipt.receipt_id }),
                );
                if let Err(err) = application.advance(ApplicationStatus::Submitted) {
                    return self.mark_failed(application, err.to_string());
                }
                application.submitted_at = Some(Utc::now());
                application.receipt_id = Some(receipt.receipt_id);
                application.append_note("submitted successfully");
                self.persist(&application);
                JobOutcome::Submitted
            }
            Err(err) => {
                // Transport failures are terminal for this attempt; retry
                // is an explicit user action, never automatic.
                let reason = err.to_string();
                self.audit.record(
                    &application.id,
                    AuditEventType::Submission,
                    "final submission",
                    json!({ "status": "failed", "error": reason }),
                );
                self.mark_failed(application, reason)
            }
        }
    }

    /// Audit-then-mutate: the status event is written before the durable
    /// status change, so a crash between the two never leaves a status
    /// change unaccompanied by its audit record.
    fn transition(
        &self,
        application: &mut Application,
        next: ApplicationStatus,
    ) -> Result<(), InvalidTransition> {
        self.audit.record(
            &application.id,
            AuditEventType::Snapshot,
            "status transition",
            json!({ "from": application.status.label(), "to": next.label() }),
        );
        application.advance(next)?;
        self.persist(application);
        Ok(())
    }

    fn mark_failed(&self, mut application: Application, reason: String) -> JobOutcome {
        if let Err(err) = application.advance(ApplicationStatus::Failed) {
            error!(%err, application = %application.id, "failure transition rejected");
            return JobOutcome::Failed(reason);
        }
        application.failure_reason = Some(reason.clone());
        self.persist(&application);
        JobOutcome::Failed(reason)
    }

    fn persist(&self, application: &Application) {
        if let Err(err) = self.repository.update(application.clone()) {
            error!(%err, application = %application.id, "failed to persist application update");
        }
    }
}

//! The autonomous application pipeline: queue draining, policy gating,
//! grounded package assembly, audited submission, and run-state control.

pub mod assembler;
pub mod audit;
pub mod domain;
pub mod grounding;
pub mod memory;
pub mod policy;
pub mod processor;
pub mod repository;
pub mod router;
pub mod state;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use assembler::{AssemblyError, JobContext, PackageAssembler};
pub use audit::{AuditEvent, AuditEventType, AuditLog};
pub use domain::{
    Application, ApplicationId, ApplicationPackage, ApplicationStatus, ApplicationStatusView,
    BulletEntry, CandidateProfile, ExperienceFact, JobId, JobPosting, MatchBreakdown, QueuedJob,
    ResumeSection,
};
pub use grounding::{FactBase, GroundingReport};
pub use policy::{BlockReason, PolicyConfig, PolicyCounters, PolicyDecision, PolicyUpdate, SkipReason};
pub use processor::{BatchProcessor, PipelineError};
pub use repository::{
    ApplicationRepository, ApplyQueue, FactStore, QueueError, RepositoryError, SubmissionError,
    SubmissionReceipt, SubmissionSink,
};
pub use router::pipeline_router;
pub use state::{BatchRunState, BatchStatusView, RunPhase};
pub use tracker::{ApplicationFilter, TrackerSummary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::ApplicationId;

/// Category of an audited pipeline action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Snapshot,
    Generation,
    PolicyCheck,
    Submission,
    Verification,
}

/// Immutable record of one pipeline decision or action. Once written it is
/// never mutated or deleted; the per-application sequence is the sole
/// source of truth for what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub step: String,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, step: &str, details: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            step: step.to_string(),
            details,
        }
    }
}

/// Append-only event sink keyed by application id.
///
/// `record` is fire-and-forget: implementations swallow their own storage
/// problems rather than fail a pipeline step, and no update or delete
/// operation exists anywhere on the trait.
pub trait AuditLog: Send + Sync {
    fn record(&self, application_id: &ApplicationId, event_type: AuditEventType, step: &str, details: Value);

    /// The strictly time-ordered event sequence for one application.
    fn read(&self, application_id: &ApplicationId) -> Vec<AuditEvent>;
}

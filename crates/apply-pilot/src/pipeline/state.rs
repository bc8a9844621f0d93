use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::JobId;

/// How many recent log lines the run state retains; oldest evicted first.
pub const RECENT_LOG_CAPACITY: usize = 100;

/// Whether the batch loop is active. `Stopping` is advisory and observed
/// between jobs, never mid-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Stopping,
}

impl RunPhase {
    pub fn label(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Stopping => "stopping",
        }
    }
}

/// Process-wide singleton describing the batch loop. Mutated exclusively by
/// the batch processor behind its lock; everyone else sees snapshots.
#[derive(Debug)]
pub struct BatchRunState {
    pub phase: RunPhase,
    /// Run generation, bumped on every claim. A loop that captured an
    /// older value has been superseded by a lease reclaim and must stand
    /// down without touching the state.
    pub epoch: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub current_job: Option<JobId>,
    pub started_at: Option<DateTime<Utc>>,
    /// Liveness lease: refreshed every iteration so a crashed process can
    /// be told apart from a live run holding the slot.
    pub heartbeat_at: Option<DateTime<Utc>>,
    recent: VecDeque<String>,
}

impl Default for BatchRunState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            epoch: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            current_job: None,
            started_at: None,
            heartbeat_at: None,
            recent: VecDeque::with_capacity(RECENT_LOG_CAPACITY),
        }
    }
}

impl BatchRunState {
    /// Reset counters, bump the run generation, and claim the run slot.
    pub fn begin_run(&mut self) {
        let now = Utc::now();
        self.phase = RunPhase::Running;
        self.epoch += 1;
        self.processed = 0;
        self.succeeded = 0;
        self.failed = 0;
        self.skipped = 0;
        self.current_job = None;
        self.started_at = Some(now);
        self.heartbeat_at = Some(now);
        self.recent.clear();
    }

    /// Release the run slot, keeping counters and log for inspection.
    pub fn finish_run(&mut self) {
        self.phase = RunPhase::Idle;
        self.current_job = None;
        self.heartbeat_at = None;
    }

    pub fn heartbeat(&mut self) {
        self.heartbeat_at = Some(Utc::now());
    }

    /// True when the slot reads `running`/`stopping` but the heartbeat is
    /// older than `timeout`: the orphaned-lock case after an unclean exit.
    pub fn lease_expired(&self, timeout: chrono::Duration) -> bool {
        if self.phase == RunPhase::Idle {
            return false;
        }
        match self.heartbeat_at {
            Some(at) => Utc::now() - at > timeout,
            None => true,
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        if self.recent.len() == RECENT_LOG_CAPACITY {
            self.recent.pop_front();
        }
        let line = format!("[{}] {}", Utc::now().format("%H:%M:%S"), message.into());
        self.recent.push_back(line);
    }

    pub fn snapshot(&self) -> BatchStatusView {
        BatchStatusView {
            phase: self.phase.label(),
            processed: self.processed,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            current_job: self.current_job.clone(),
            started_at: self.started_at,
            heartbeat_at: self.heartbeat_at,
            recent_logs: self.recent.iter().cloned().collect(),
        }
    }
}

/// Read-only run state snapshot for polling consumers.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatusView {
    pub phase: &'static str,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub recent_logs: Vec<String>,
}

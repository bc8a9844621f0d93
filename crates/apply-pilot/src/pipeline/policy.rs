use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::QueuedJob;

/// User-controlled submission constraints, read by every policy check and
/// mutated only through the control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Halts all further submissions immediately.
    #[serde(default)]
    pub kill_switch: bool,
    /// Maximum submissions in any trailing 24-hour window. 0 disables the
    /// limit.
    #[serde(default)]
    pub daily_limit: u32,
    /// Case-insensitive company names. A job matches when a trimmed entry
    /// is contained in the job's company name, so "Acme" blocks "Acme Inc".
    #[serde(default)]
    pub blocked_companies: Vec<String>,
    /// Jobs scoring below this are skipped.
    #[serde(default)]
    pub min_match_score: f32,
    /// When set, non-remote jobs are skipped.
    #[serde(default)]
    pub remote_only: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kill_switch: false,
            daily_limit: 0,
            blocked_companies: Vec::new(),
            min_match_score: 60.0,
            remote_only: false,
            updated_at: Utc::now(),
        }
    }
}

/// Partial update applied by the control surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyUpdate {
    pub kill_switch: Option<bool>,
    pub daily_limit: Option<u32>,
    pub blocked_companies: Option<Vec<String>>,
    pub min_match_score: Option<f32>,
    pub remote_only: Option<bool>,
}

impl PolicyConfig {
    pub fn apply(&mut self, update: PolicyUpdate) {
        if let Some(kill_switch) = update.kill_switch {
            self.kill_switch = kill_switch;
        }
        if let Some(daily_limit) = update.daily_limit {
            self.daily_limit = daily_limit;
        }
        if let Some(blocked) = update.blocked_companies {
            self.blocked_companies = blocked;
        }
        if let Some(min_match_score) = update.min_match_score {
            self.min_match_score = min_match_score;
        }
        if let Some(remote_only) = update.remote_only {
            self.remote_only = remote_only;
        }
        self.updated_at = Utc::now();
    }
}

/// Rolling counters the engine needs beyond the static config.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyCounters {
    /// Submissions with a submission timestamp inside the trailing 24 hours.
    pub submitted_last_24h: u32,
}

/// Outcome of one policy check.
///
/// `Block` protects against runaway spend and halts the whole run; `Skip`
/// protects per-job suitability and only advances past the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolicyDecision {
    Allow,
    Skip(SkipReason),
    Block(BlockReason),
}

impl PolicyDecision {
    pub fn summary(&self) -> String {
        match self {
            PolicyDecision::Allow => "policy checks passed".to_string(),
            PolicyDecision::Skip(reason) => reason.summary(),
            PolicyDecision::Block(reason) => reason.summary(),
        }
    }
}

/// Per-job exclusion; the run continues with the next queued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    BlocklistedCompany { company: String },
    NonRemote,
    ScoreBelowThreshold { score: f32, minimum: f32 },
}

impl SkipReason {
    pub fn summary(&self) -> String {
        match self {
            SkipReason::BlocklistedCompany { company } => {
                format!("blocklisted company '{company}'")
            }
            SkipReason::NonRemote => "non-remote job excluded by policy".to_string(),
            SkipReason::ScoreBelowThreshold { score, minimum } => {
                format!("match score {score:.0} below threshold {minimum:.0}")
            }
        }
    }
}

/// Run-level halt; no further jobs are dequeued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockReason {
    KillSwitch,
    DailyLimitReached { submitted: u32, limit: u32 },
}

impl BlockReason {
    pub fn summary(&self) -> String {
        match self {
            BlockReason::KillSwitch => "global kill switch active".to_string(),
            BlockReason::DailyLimitReached { submitted, limit } => {
                format!("daily limit reached ({submitted}/{limit})")
            }
        }
    }
}

/// Evaluate a queued job against the current policy. Rules run in a fixed,
/// documented order and the first decisive rule wins:
///
/// 1. kill switch
/// 2. daily limit
/// 3. company blocklist
/// 4. remote-only
/// 5. minimum match score
pub fn evaluate(
    job: &QueuedJob,
    config: &PolicyConfig,
    counters: &PolicyCounters,
) -> PolicyDecision {
    if config.kill_switch {
        return PolicyDecision::Block(BlockReason::KillSwitch);
    }

    if config.daily_limit > 0 && counters.submitted_last_24h >= config.daily_limit {
        return PolicyDecision::Block(BlockReason::DailyLimitReached {
            submitted: counters.submitted_last_24h,
            limit: config.daily_limit,
        });
    }

    let company = job.job.company.trim().to_lowercase();
    if config
        .blocked_companies
        .iter()
        .map(|entry| entry.trim().to_lowercase())
        .any(|entry| !entry.is_empty() && company.contains(&entry))
    {
        return PolicyDecision::Skip(SkipReason::BlocklistedCompany {
            company: job.job.company.clone(),
        });
    }

    if config.remote_only && !job.job.remote {
        return PolicyDecision::Skip(SkipReason::NonRemote);
    }

    if job.match_score < config.min_match_score {
        return PolicyDecision::Skip(SkipReason::ScoreBelowThreshold {
            score: job.match_score,
            minimum: config.min_match_score,
        });
    }

    PolicyDecision::Allow
}

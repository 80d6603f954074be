//! Observable records for asynchronous warm-up conversions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Lifecycle state of a warm-up job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The conversion is queued or running.
    Pending,
    /// The artifact is in the cache.
    Done,
    /// The conversion failed; `message` carries the reason.
    Failed,
}

/// Status snapshot for one warm-up job, keyed by cache key.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    /// Cache key of the derivative being produced.
    pub key: String,
    /// Current state.
    pub state: JobState,
    /// Failure reason, present only for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    fn new(key: String, state: JobState, message: Option<String>) -> Self {
        Self {
            key,
            state,
            message,
            updated_at: Utc::now(),
        }
    }
}

/// Retention for terminal (Done/Failed) records. Long enough for any
/// reasonable poller, short enough that the registry stays bounded on a
/// long-running host.
const TERMINAL_RETENTION_SECS: i64 = 3600;

/// In-memory registry of warm-up jobs. Terminal records are kept for a
/// retention window so callers can poll them, then pruned on the next
/// insert; pending records are never pruned.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    records: Arc<DashMap<String, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a conversion for this key has been accepted.
    pub fn mark_pending(&self, key: &str) -> JobRecord {
        self.prune_terminal(Utc::now() - chrono::Duration::seconds(TERMINAL_RETENTION_SECS));
        let record = JobRecord::new(key.to_string(), JobState::Pending, None);
        self.records.insert(key.to_string(), record.clone());
        record
    }

    /// Drop terminal records whose last state change predates the cutoff.
    fn prune_terminal(&self, cutoff: DateTime<Utc>) {
        self.records
            .retain(|_, r| r.state == JobState::Pending || r.updated_at >= cutoff);
    }

    /// Record a successful completion.
    pub fn mark_done(&self, key: &str) {
        self.records.insert(
            key.to_string(),
            JobRecord::new(key.to_string(), JobState::Done, None),
        );
    }

    /// Record a failure with its reason.
    pub fn mark_failed(&self, key: &str, message: String) {
        self.records.insert(
            key.to_string(),
            JobRecord::new(key.to_string(), JobState::Failed, Some(message)),
        );
    }

    /// Look up a job record.
    pub fn get(&self, key: &str) -> Option<JobRecord> {
        self.records.get(key).map(|r| r.clone())
    }
}

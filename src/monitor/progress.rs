//! Progress record structures.
//!
//! A running backup job publishes one progress record per target
//! namespace (`BackupInfo.json`). The record is written atomically, so a
//! concurrent reader always sees a mutually consistent snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object name of the progress record inside a namespace.
pub const PROGRESS_OBJECT_NAME: &str = "BackupInfo.json";

/// Status of the publishing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// The job is still examining and shipping data.
    Running,
    /// Terminal: the job wrote its last record. No further record follows
    /// within one job run.
    Finished,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Finished => write!(f, "finished"),
        }
    }
}

/// One snapshot of a job's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Total number of bytes the job will examine. Invariant across the
    /// lifetime of one job.
    pub total_size: u64,

    /// Bytes examined so far. Monotonically non-decreasing, never exceeds
    /// `total_size`.
    pub seen: u64,

    /// Bytes shipped to the backend so far. Monotonically non-decreasing.
    pub sent_to_backend: u64,

    /// Bytes not yet examined; reaches 0 only at completion.
    pub still_to_be_examined: u64,

    /// Job status.
    pub status: JobStatus,

    /// Bytes kept for shipping after examination.
    #[serde(default)]
    pub kept: u64,

    /// Bytes still in flight: not yet examined plus kept-but-unsent.
    #[serde(default)]
    pub pending: u64,

    /// First snapshot of the replication range, when bounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_snapshot: Option<String>,

    /// Last snapshot of the replication range, when bounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_snapshot: Option<String>,

    /// When the job started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,

    /// When this record was published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_date: Option<DateTime<Utc>>,

    /// Job runtime at publication time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_in_seconds: Option<u64>,
}

impl ProgressSample {
    /// Whether this is a terminal record.
    pub fn is_finished(&self) -> bool {
        self.status == JobStatus::Finished
    }

    /// Whether this is a well-formed terminal record: finished, everything
    /// examined, nothing left, and no more shipped than examined.
    pub fn is_complete(&self) -> bool {
        self.is_finished()
            && self.seen == self.total_size
            && self.still_to_be_examined == 0
            && self.sent_to_backend <= self.total_size
    }

    /// Examination progress in percent, saturating at 100.
    pub fn percent_seen(&self) -> u8 {
        if self.total_size == 0 {
            return 100;
        }
        ((self.seen.saturating_mul(100)) / self.total_size).min(100) as u8
    }
}

//! Lease record structure and utilities.
//!
//! A lease is represented by exactly one record per namespace, stored as an
//! object (`global_lock.json`) inside the namespace itself. The record's
//! identity for contention purposes is its *tag*: the unique owner id plus
//! the heartbeat counter. A holder proves liveness by bumping the counter;
//! contenders never compare wall clocks across processes, they only watch
//! the tag change.

use crate::error::{NslockError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

/// Object name of the lease record inside a namespace.
pub const LOCK_OBJECT_NAME: &str = "global_lock.json";

/// Lease record stored in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Namespace the lease covers.
    pub namespace: String,

    /// Owner of the lease (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the lease holder.
    pub pid: u32,

    /// Unique id of this holder instance; part of the lease tag.
    pub owner_id: String,

    /// Heartbeat counter; part of the lease tag. Bumped on every renewal.
    pub counter: u64,

    /// Declared time between heartbeats, in milliseconds. Contenders use
    /// this as their observation window.
    pub heartbeat_millis: u64,

    /// Timestamp when the lease was taken (RFC3339).
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last heartbeat (RFC3339).
    pub updated_at: DateTime<Utc>,
}

impl LeaseRecord {
    /// Create a fresh record for a new acquisition attempt.
    pub fn new(namespace: &str, heartbeat: StdDuration) -> Self {
        let now = Utc::now();
        let pid = std::process::id();
        Self {
            namespace: namespace.to_string(),
            owner: owner_string(),
            pid,
            owner_id: format!("{}-{}", pid, now.timestamp_nanos_opt().unwrap_or_default()),
            counter: 0,
            heartbeat_millis: heartbeat.as_millis() as u64,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `other` carries the same tag, i.e. the holder has not
    /// heartbeated between the two observations.
    pub fn same_tag(&self, other: &LeaseRecord) -> bool {
        self.owner_id == other.owner_id && self.counter == other.counter
    }

    /// Whether `other` was written by the same holder instance.
    pub fn same_owner(&self, other: &LeaseRecord) -> bool {
        self.owner_id == other.owner_id
    }

    /// The declared heartbeat interval.
    pub fn heartbeat_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.heartbeat_millis.max(1))
    }

    /// Record a heartbeat: bump the counter and refresh the timestamp.
    pub fn tick(&mut self) {
        self.counter += 1;
        self.updated_at = Utc::now();
    }

    /// Parse a record from JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| NslockError::UserError(format!("failed to parse lease record: {}", e)))
    }

    /// Serialize the record to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| NslockError::UserError(format!("failed to serialize lease record: {}", e)))
    }

    /// Age of the last heartbeat.
    pub fn heartbeat_age(&self) -> Duration {
        Utc::now().signed_duration_since(self.updated_at)
    }

    /// Format the heartbeat age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.heartbeat_age();
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds.max(0))
        }
    }

    /// Whether the holder has missed enough heartbeats that it is presumed
    /// dead. Only used for display purposes; the acquisition protocol
    /// decides liveness by observing the tag, not the clock.
    pub fn presumed_dead(&self, misses: u32) -> bool {
        let window = self.heartbeat_millis.saturating_mul(misses as u64);
        self.heartbeat_age() > Duration::milliseconds(window as i64)
    }
}

/// Get the owner string for lease records.
pub(crate) fn owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

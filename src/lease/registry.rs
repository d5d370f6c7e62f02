//! Registry of spawned lock-holder processes.
//!
//! The registry is the single place that owns child process handles for
//! outstanding leases. Entries are added by a successful acquire and
//! removed exactly once: by release, by kill, or by the sweep. Mutation is
//! serialized behind a mutex so one client can be shared across threads.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::process::Child;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Identifies one outstanding lease.
///
/// The handle is a move-only token: releasing or killing consumes it, so a
/// double release is unrepresentable.
#[derive(Debug)]
pub struct LockHandle {
    id: u64,
    namespace: String,
    session_timeout: Duration,
    created_at: DateTime<Utc>,
}

impl LockHandle {
    /// Opaque registry id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Namespace the lease covers.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Session timeout the holder was started with.
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// When the lease was acquired.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A registered holder process.
pub(crate) struct RegisteredHolder {
    pub child: Child,
    pub namespace: String,
}

/// Process-wide table of holder processes, keyed by opaque handle id.
#[derive(Default)]
pub struct LockRegistry {
    entries: Mutex<HashMap<u64, RegisteredHolder>>,
    next_id: AtomicU64,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spawned holder and mint its handle.
    pub(crate) fn register(
        &self,
        child: Child,
        namespace: &str,
        session_timeout: Duration,
    ) -> LockHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            id,
            RegisteredHolder {
                child,
                namespace: namespace.to_string(),
            },
        );
        LockHandle {
            id,
            namespace: namespace.to_string(),
            session_timeout,
            created_at: Utc::now(),
        }
    }

    /// Remove and return the holder for a handle id.
    pub(crate) fn deregister(&self, id: u64) -> Option<RegisteredHolder> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(&id)
    }

    /// Remove and return all registered holders.
    pub(crate) fn drain(&self) -> Vec<RegisteredHolder> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.drain().map(|(_, holder)| holder).collect()
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

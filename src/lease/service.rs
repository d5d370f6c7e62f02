//! The lease acquisition, heartbeat and release protocol.
//!
//! Liveness is decided by observing the lease tag, never by comparing
//! clocks across processes: a contender samples the record once per
//! heartbeat period and steals the lease only after the tag has stayed
//! unchanged for [`HEARTBEAT_MISSES_BEFORE_STEAL`] consecutive periods.
//! A record that disappears mid-observation was released and is taken
//! immediately. A tag that keeps changing belongs to a live holder, and
//! the attempt fails once the observation budget is spent.
//!
//! Both the contended-failure path and the crash-recovery path therefore
//! take at least `HEARTBEAT_MISSES_BEFORE_STEAL` session periods, while an
//! uncontended acquisition is immediate.

use crate::error::Result;
use crate::lease::record::LeaseRecord;
use crate::lease::store::LeaseStore;
use std::thread;
use std::time::Duration;

/// Number of consecutive unchanged observations after which a holder is
/// presumed dead and its lease may be broken. This doubles as the retry
/// budget of an acquisition attempt.
pub const HEARTBEAT_MISSES_BEFORE_STEAL: u32 = 3;

/// Outcome of one acquisition attempt.
///
/// Contention is an expected result, not an error; errors are reserved for
/// store and I/O failures.
pub enum AcquireOutcome {
    /// The lease was taken; heartbeat and release through the [`ActiveLease`].
    Acquired(ActiveLease),
    /// A live holder kept the lease through the whole observation window.
    Contended {
        /// Owner string of the record observed last.
        owner: String,
    },
}

/// One acquisition attempt against a namespace's lease store.
pub struct LeaseService {
    store: Box<dyn LeaseStore>,
    namespace: String,
    heartbeat: Duration,
}

impl LeaseService {
    pub fn new(store: Box<dyn LeaseStore>, namespace: &str, session_timeout: Duration) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            heartbeat: session_timeout,
        }
    }

    /// Try to take the lease, observing a current holder for up to
    /// `HEARTBEAT_MISSES_BEFORE_STEAL` heartbeat periods.
    pub fn acquire(self) -> Result<AcquireOutcome> {
        // Fast path: nobody holds the lease.
        let candidate = LeaseRecord::new(&self.namespace, self.heartbeat);
        if self.store.create(&candidate)? {
            tracing::info!(
                namespace = %self.namespace,
                lease = %self.store.describe(),
                "lease taken"
            );
            return Ok(AcquireOutcome::Acquired(ActiveLease {
                store: self.store,
                record: candidate,
            }));
        }

        let Some(mut last) = self.store.read()? else {
            // The record vanished between create and read: released right
            // now. One more immediate attempt before entering observation.
            let candidate = LeaseRecord::new(&self.namespace, self.heartbeat);
            if self.store.create(&candidate)? {
                return Ok(AcquireOutcome::Acquired(ActiveLease {
                    store: self.store,
                    record: candidate,
                }));
            }
            return Ok(AcquireOutcome::Contended {
                owner: "unknown".to_string(),
            });
        };

        tracing::info!(
            namespace = %self.namespace,
            owner = %last.owner,
            pid = last.pid,
            "lease is held, watching its heartbeat"
        );

        let mut unchanged: u32 = 0;
        for _ in 0..HEARTBEAT_MISSES_BEFORE_STEAL {
            // Observe at the granularity the holder declared, so a contender
            // configured with a shorter session cannot rob a slower holder.
            thread::sleep(last.heartbeat_interval().max(self.heartbeat));

            match self.store.read()? {
                None => {
                    // Released while we were waiting.
                    let candidate = LeaseRecord::new(&self.namespace, self.heartbeat);
                    if self.store.create(&candidate)? {
                        tracing::info!(namespace = %self.namespace, "lease taken after release");
                        return Ok(AcquireOutcome::Acquired(ActiveLease {
                            store: self.store,
                            record: candidate,
                        }));
                    }
                    // Another contender beat us to it; the budget is spent.
                    return Ok(AcquireOutcome::Contended {
                        owner: last.owner.clone(),
                    });
                }
                Some(current) => {
                    if current.same_tag(&last) {
                        unchanged += 1;
                        if unchanged >= HEARTBEAT_MISSES_BEFORE_STEAL {
                            return self.steal(&current);
                        }
                    } else {
                        unchanged = 0;
                        last = current;
                    }
                }
            }
        }

        tracing::info!(
            namespace = %self.namespace,
            owner = %last.owner,
            "holder is alive, giving up"
        );
        Ok(AcquireOutcome::Contended { owner: last.owner })
    }

    /// Break a dead holder's lease and take it.
    fn steal(self, dead: &LeaseRecord) -> Result<AcquireOutcome> {
        tracing::warn!(
            namespace = %self.namespace,
            owner = %dead.owner,
            pid = dead.pid,
            "holder missed {} heartbeats, breaking its lease",
            HEARTBEAT_MISSES_BEFORE_STEAL
        );
        self.store.remove()?;

        let candidate = LeaseRecord::new(&self.namespace, self.heartbeat);
        if self.store.create(&candidate)? {
            Ok(AcquireOutcome::Acquired(ActiveLease {
                store: self.store,
                record: candidate,
            }))
        } else {
            // Another contender stole it between our remove and create.
            Ok(AcquireOutcome::Contended {
                owner: dead.owner.clone(),
            })
        }
    }
}

/// A held lease. The holder must call [`ActiveLease::heartbeat`] once per
/// session period and [`ActiveLease::release`] on the way out.
pub struct ActiveLease {
    store: Box<dyn LeaseStore>,
    record: LeaseRecord,
}

impl ActiveLease {
    /// The record as last written by this holder.
    pub fn record(&self) -> &LeaseRecord {
        &self.record
    }

    /// Renew the lease. Returns false when the record was lost to another
    /// owner, in which case the holder no longer owns the namespace and
    /// must stop whatever the lease was protecting.
    pub fn heartbeat(&mut self) -> Result<bool> {
        match self.store.read()? {
            Some(current) if current.same_owner(&self.record) => {
                self.record.tick();
                self.store.replace(&self.record)?;
                Ok(true)
            }
            _ => {
                tracing::error!(
                    namespace = %self.record.namespace,
                    lease = %self.store.describe(),
                    "lost the lease"
                );
                Ok(false)
            }
        }
    }

    /// Relinquish the lease. Removing a record that was already lost to
    /// another owner is skipped silently.
    pub fn release(self) -> Result<()> {
        match self.store.read()? {
            Some(current) if current.same_owner(&self.record) => {
                tracing::info!(namespace = %self.record.namespace, "releasing lease");
                self.store.remove()
            }
            _ => {
                tracing::warn!(
                    namespace = %self.record.namespace,
                    "lease was no longer ours at release time"
                );
                Ok(())
            }
        }
    }
}

//! Namespace lease locking.
//!
//! This module implements both sides of the lease-lock protocol:
//!
//! - The **client** side ([`LeaseLockClient`]) spawns an external holder
//!   process per lease, interprets its stdout handshake, and tracks it in
//!   the [`LockRegistry`] until release, kill or sweep.
//! - The **holder** side ([`LeaseService`]/[`ActiveLease`]) runs against a
//!   [`LeaseStore`] (local filesystem or remote REST object store) using a
//!   heartbeat-observation protocol: a contender breaks a lease only after
//!   watching its tag stay unchanged for three heartbeat periods.
//!
//! A lease is exclusive per namespace; leases in different namespaces are
//! fully independent.

mod client;
mod record;
mod registry;
mod service;
mod store;

#[cfg(test)]
mod tests;

pub use client::{
    AcquireOptions, DEFAULT_HOLDER_COMMAND, FAILURE_MARKER, HOLDER_PROCESS_NAME, LeaseLockClient,
    SUCCESS_MARKER, sweep_holder_processes,
};
pub use record::{LOCK_OBJECT_NAME, LeaseRecord};
pub use registry::{LockHandle, LockRegistry};
pub use service::{
    AcquireOutcome, ActiveLease, HEARTBEAT_MISSES_BEFORE_STEAL, LeaseService,
};
pub use store::{FileLeaseStore, LeaseStore, RestLeaseStore, store_for};

//! nslock: namespace lease-lock coordination and backup progress monitoring.
//!
//! Two cooperating pieces:
//!
//! - [`lease`]: exclusive per-namespace leases held by external holder
//!   processes. The client spawns a holder, reads its stdout handshake and
//!   tracks it in a registry; the holder heartbeats a lease record stored
//!   in the namespace, which contenders observe to tell a live holder from
//!   a crashed one.
//! - [`monitor`]: polling of the progress record a long-running backup
//!   job publishes to its target namespace, with monotonicity validation
//!   of the sampled sequence.
//!
//! The `nslock` binary wires both into a CLI; the holder process itself is
//! the `nslock hold` subcommand.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod lease;
pub mod monitor;

#[cfg(test)]
mod test_support;

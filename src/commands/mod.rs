//! Command implementations for nslock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod hold;
mod locks;
mod monitor;
mod sweep;

use crate::cli::Command;
use crate::error::Result;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Hold(args) => hold::cmd_hold(args),
        Command::Sweep => sweep::cmd_sweep(),
        Command::Locks(args) => locks::cmd_locks(args),
        Command::Monitor(args) => monitor::cmd_monitor(args),
    }
}

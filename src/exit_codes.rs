//! Exit code constants for the nslock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid target or config)
//! - 2: Backend failure (unsupported or misconfigured backend)
//! - 3: Process failure (spawn/signal/reap errors)
//! - 4: Lock acquisition failure
//! - 5: Progress protocol violation

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid namespace or config.
pub const USER_ERROR: i32 = 1;

/// Backend failure: unsupported backend kind or incomplete backend config.
pub const BACKEND_FAILURE: i32 = 2;

/// Process failure: a holder process could not be spawned, signalled or reaped.
pub const PROCESS_FAILURE: i32 = 3;

/// Lock acquisition failure: the lease is held by another live process.
pub const LOCK_FAILURE: i32 = 4;

/// Progress protocol violation: a monitored job's progress record regressed
/// or the job finished without a terminal record.
pub const PROTOCOL_FAILURE: i32 = 5;

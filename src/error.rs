//! Error types for nslock.
//!
//! Uses thiserror for derive macros. Lock acquisition failures carry the
//! namespace, the raw handshake response and the holder's stderr so a
//! failed run can be diagnosed without re-running under a debugger.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for nslock operations.
///
/// Each variant maps to a specific exit code (see [`exit_codes`]).
#[derive(Error, Debug)]
pub enum NslockError {
    /// The lease could not be acquired within the retry budget, or the
    /// holder process reported failure.
    #[error(
        "failed to take lock, maybe another lock process is running for namespace '{namespace}'\n\
         response: {response}\n\
         stderr: {stderr}"
    )]
    LockNotTaken {
        namespace: String,
        response: String,
        stderr: String,
    },

    /// Caller supplied a target or config that does not satisfy the
    /// namespace/backend contract. Fatal to the call, never retried.
    #[error("{0}")]
    WrongArgumentType(String),

    /// Backend kind outside the supported set. Fatal, never retried.
    #[error("backend type not supported: {0}")]
    BackendNotSupported(String),

    /// A monitored job broke the progress protocol: it reported completion
    /// without a terminal sample, or its progress record regressed.
    #[error("progress protocol violation: {0}")]
    ProtocolViolation(String),

    /// Spawning, signalling or reaping an external process failed.
    #[error("process operation failed: {0}")]
    ProcessError(String),

    /// User provided invalid arguments or the system is in an invalid state.
    #[error("{0}")]
    UserError(String),
}

impl NslockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            NslockError::LockNotTaken { .. } => exit_codes::LOCK_FAILURE,
            NslockError::WrongArgumentType(_) => exit_codes::USER_ERROR,
            NslockError::BackendNotSupported(_) => exit_codes::BACKEND_FAILURE,
            NslockError::ProtocolViolation(_) => exit_codes::PROTOCOL_FAILURE,
            NslockError::ProcessError(_) => exit_codes::PROCESS_FAILURE,
            NslockError::UserError(_) => exit_codes::USER_ERROR,
        }
    }
}

/// Result type alias for nslock operations.
pub type Result<T> = std::result::Result<T, NslockError>;

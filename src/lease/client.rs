//! Client side of the lease-lock protocol.
//!
//! Acquiring a lease means spawning an external holder process and reading
//! its handshake line: the holder performs its own bounded retry against
//! the lock store and reports the final outcome as the first line on
//! stdout, carrying either the success or the failure marker. All further
//! coordination with the holder happens through signals and its exit
//! status; there is no shared state beyond the lease record itself.

use crate::backend::NamespaceTarget;
use crate::error::{NslockError, Result};
use crate::lease::registry::{LockHandle, LockRegistry};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use sysinfo::System;

/// Substring a holder prints on its first stdout line after taking the lease.
pub const SUCCESS_MARKER: &str = "OK";

/// Substring a holder prints when it gives up on the lease.
pub const FAILURE_MARKER: &str = "FAILURE";

/// Process name the sweep looks for.
pub const HOLDER_PROCESS_NAME: &str = "nslock";

/// Command used to spawn holder processes unless overridden.
pub const DEFAULT_HOLDER_COMMAND: &str = "nslock hold";

/// Options for one acquisition.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Lock session timeout: the holder's heartbeat period, and the unit
    /// the retry budget is expressed in.
    pub session_timeout: Duration,

    /// How long the holder should keep the lease before releasing on its
    /// own. None means until it is signalled.
    pub run_for: Option<Duration>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(1),
            run_for: None,
        }
    }
}

/// Acquires, releases and force-kills namespace leases by managing holder
/// processes. Registered holders live in the embedded [`LockRegistry`].
pub struct LeaseLockClient {
    registry: LockRegistry,
    holder_command: String,
}

impl Default for LeaseLockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseLockClient {
    pub fn new() -> Self {
        Self::with_holder_command(DEFAULT_HOLDER_COMMAND)
    }

    /// Use a custom holder command line (e.g. an absolute path to the
    /// binary in tests). The command is parsed with shell-words rules.
    pub fn with_holder_command(command: impl Into<String>) -> Self {
        Self {
            registry: LockRegistry::new(),
            holder_command: command.into(),
        }
    }

    /// The registry of outstanding leases.
    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    /// Take an exclusive lease on the target namespace.
    ///
    /// Blocks until the spawned holder reports success or failure, or exits.
    /// The holder retries internally for a bounded number of session
    /// periods; intermediate retries are not observable here, only the
    /// final outcome.
    ///
    /// # Returns
    ///
    /// * `Ok(LockHandle)` - The holder runs, holds the lease, and is
    ///   registered under the returned handle.
    /// * `Err(NslockError::LockNotTaken)` - The holder reported failure,
    ///   exited without a handshake, or produced an unrecognizable
    ///   handshake line.
    pub fn acquire(&self, target: &NamespaceTarget, options: &AcquireOptions) -> Result<LockHandle> {
        let argv = self.holder_argv(target, options)?;

        tracing::info!(
            namespace = %target.namespace(),
            command = %shell_words::join(&argv),
            "starting lock process"
        );

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                NslockError::ProcessError(format!(
                    "failed to start lock process '{}': {}\n\
                     Fix: ensure the holder binary is installed and in PATH.",
                    argv[0], e
                ))
            })?;

        match self.read_handshake(&mut child)? {
            Some(response) if response.contains(SUCCESS_MARKER) => {
                let handle =
                    self.registry
                        .register(child, target.namespace(), options.session_timeout);
                tracing::info!(
                    namespace = %target.namespace(),
                    handle = handle.id(),
                    "lease acquired"
                );
                Ok(handle)
            }
            Some(response) if response.contains(FAILURE_MARKER) => {
                let stderr = read_stderr(&mut child);
                let _ = child.wait();
                Err(NslockError::LockNotTaken {
                    namespace: target.namespace().to_string(),
                    response,
                    stderr,
                })
            }
            Some(response) => {
                // The holder is alive but talking nonsense; take it down
                // before reporting the strange line.
                tracing::error!(namespace = %target.namespace(), %response, "strange handshake line");
                let _ = child.kill();
                let stderr = read_stderr(&mut child);
                let _ = child.wait();
                Err(NslockError::LockNotTaken {
                    namespace: target.namespace().to_string(),
                    response,
                    stderr,
                })
            }
            None => {
                // Exited without a handshake.
                let stderr = read_stderr(&mut child);
                let status = child.wait().map_err(|e| {
                    NslockError::ProcessError(format!("failed to reap lock process: {}", e))
                })?;
                Err(NslockError::LockNotTaken {
                    namespace: target.namespace().to_string(),
                    response: format!("<no handshake, exit status {:?}>", status.code()),
                    stderr,
                })
            }
        }
    }

    /// Gracefully stop the holder: it releases the lease and exits.
    ///
    /// Consumes the handle; the registry entry is removed exactly once.
    pub fn release(&self, handle: LockHandle) -> Result<()> {
        let holder = self.registry.deregister(handle.id()).ok_or_else(|| {
            NslockError::UserError(format!(
                "no registered lock process for handle {} (namespace '{}')",
                handle.id(),
                handle.namespace()
            ))
        })?;

        let mut child = holder.child;
        signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).map_err(|e| {
            NslockError::ProcessError(format!(
                "failed to signal lock process {} for namespace '{}': {}",
                child.id(),
                holder.namespace,
                e
            ))
        })?;

        let status = child.wait().map_err(|e| {
            NslockError::ProcessError(format!("failed to reap lock process: {}", e))
        })?;
        if !status.success() {
            tracing::warn!(
                namespace = %holder.namespace,
                code = ?status.code(),
                "lock process exited non-zero on release"
            );
        }
        tracing::info!(namespace = %holder.namespace, "lease released");
        Ok(())
    }

    /// Forcibly terminate the holder without letting it release the lease,
    /// simulating a crash. The lease record stays behind; contenders can
    /// only take it over once the holder's heartbeats are missed.
    pub fn kill(&self, handle: LockHandle) -> Result<()> {
        let holder = self.registry.deregister(handle.id()).ok_or_else(|| {
            NslockError::UserError(format!(
                "no registered lock process for handle {} (namespace '{}')",
                handle.id(),
                handle.namespace()
            ))
        })?;

        let mut child = holder.child;
        child.kill().map_err(|e| {
            NslockError::ProcessError(format!(
                "failed to kill lock process {} for namespace '{}': {}",
                child.id(),
                holder.namespace,
                e
            ))
        })?;
        child.wait().map_err(|e| {
            NslockError::ProcessError(format!("failed to reap lock process: {}", e))
        })?;
        tracing::info!(namespace = %holder.namespace, "lock process killed");
        Ok(())
    }

    /// Best-effort sweep of every holder process on this host, including
    /// stragglers left behind by other runs. Each match gets the graceful
    /// release signal; our own registered children are reaped and the
    /// registry is cleared. Returns the number of processes signalled.
    pub fn stop_all(&self) -> Result<usize> {
        let signalled = sweep_holder_processes()?;

        for holder in self.registry.drain() {
            let mut child = holder.child;
            // The sweep already signalled it; make sure even a renamed
            // binary gets the signal, then reap.
            let _ = signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM);
            let _ = child.wait();
        }

        Ok(signalled)
    }

    /// Build the full holder argv for a target.
    fn holder_argv(&self, target: &NamespaceTarget, options: &AcquireOptions) -> Result<Vec<String>> {
        let mut argv = shell_words::split(&self.holder_command).map_err(|e| {
            NslockError::UserError(format!(
                "failed to parse holder command '{}': {}",
                self.holder_command, e
            ))
        })?;
        if argv.is_empty() {
            return Err(NslockError::UserError(
                "holder command is empty".to_string(),
            ));
        }

        argv.push("--namespace".to_string());
        argv.push(target.namespace().to_string());
        argv.push("--session-timeout".to_string());
        argv.push(options.session_timeout.as_secs().max(1).to_string());
        if let Some(run_for) = options.run_for {
            argv.push("--run-millis".to_string());
            argv.push(run_for.as_millis().to_string());
        }
        argv.extend(target.backend().invocation_args());
        Ok(argv)
    }

    /// Read the first non-empty stdout line, or None when the process
    /// exits without producing one.
    fn read_handshake(&self, child: &mut Child) -> Result<Option<String>> {
        let stdout = child.stdout.take().ok_or_else(|| {
            NslockError::ProcessError("lock process stdout was not captured".to_string())
        })?;
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line).map_err(|e| {
                NslockError::ProcessError(format!("failed to read lock process stdout: {}", e))
            })?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }
}

/// Drain whatever the holder wrote to stderr, for diagnostics.
fn read_stderr(child: &mut Child) -> String {
    match child.stderr.take() {
        Some(mut stderr) => {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf.trim().to_string()
        }
        None => String::new(),
    }
}

/// Signal every holder process on the host for graceful release.
///
/// Matches on the holder process name plus its `hold` argument, skipping
/// the current process. Missing processes are not an error; a host without
/// holders yields zero.
pub fn sweep_holder_processes() -> Result<usize> {
    let sys = System::new_all();
    let own_pid = std::process::id();
    let mut signalled = 0;

    for (pid, process) in sys.processes() {
        if pid.as_u32() == own_pid {
            continue;
        }
        if !process.name().contains(HOLDER_PROCESS_NAME) {
            continue;
        }
        if !process.cmd().iter().any(|arg| arg == "hold") {
            continue;
        }

        tracing::info!(pid = pid.as_u32(), "signalling stray lock process");
        match signal::kill(Pid::from_raw(pid.as_u32() as i32), Signal::SIGTERM) {
            Ok(()) => signalled += 1,
            // Raced with the process exiting on its own.
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => {
                tracing::warn!(pid = pid.as_u32(), "failed to signal lock process: {}", e);
            }
        }
    }

    Ok(signalled)
}

//! Implementation of the `nslock hold` command: the lock-holding process.
//!
//! The handshake contract with the spawning client: the first line written
//! to stdout carries either the success marker (the lease is held and will
//! be heartbeated) or the failure marker (a live holder kept it through
//! the whole retry window). Diagnostics go to stderr only; stdout belongs
//! to the handshake.
//!
//! SIGTERM and SIGINT request a graceful release: the holder removes its
//! lease record and exits 0. A SIGKILL leaves the record behind, and
//! contenders can take the namespace over only after the heartbeats have
//! been missed for the full observation window.

use crate::cli::HoldArgs;
use crate::error::{NslockError, Result};
use crate::lease::{AcquireOutcome, ActiveLease, FAILURE_MARKER, LeaseService, SUCCESS_MARKER};
use crate::{backend::NamespaceTarget, lease};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Loop granularity of the hold loop; bounds the release latency.
const TICK: Duration = Duration::from_millis(20);

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_shutdown_signal(_: nix::libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

pub fn cmd_hold(args: HoldArgs) -> Result<()> {
    let backend = args.backend.resolve()?;
    let target = NamespaceTarget::new(&args.namespace, backend)?;
    let session = Duration::from_secs(args.session_timeout.max(1));

    install_signal_handlers()?;

    let store = lease::store_for(&target)?;
    let service = LeaseService::new(store, target.namespace(), session);

    tracing::info!(
        namespace = %target.namespace(),
        session_secs = session.as_secs(),
        "attempting to take namespace lease"
    );

    match service.acquire()? {
        AcquireOutcome::Acquired(lease) => {
            handshake(&format!(
                "{} lease taken for namespace {}",
                SUCCESS_MARKER,
                target.namespace()
            ))?;
            hold(lease, session, args.run_millis)
        }
        AcquireOutcome::Contended { owner } => {
            tracing::warn!(
                namespace = %target.namespace(),
                %owner,
                "lease is held by a live process"
            );
            let response = format!(
                "{} to take lock in namespace {} (held by {})",
                FAILURE_MARKER,
                target.namespace(),
                owner
            );
            handshake(&response)?;
            Err(NslockError::LockNotTaken {
                namespace: target.namespace().to_string(),
                response,
                stderr: String::new(),
            })
        }
    }
}

/// Print the handshake line and make sure it reaches the client before
/// anything else blocks.
fn handshake(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", line)
        .and_then(|_| stdout.flush())
        .map_err(|e| NslockError::ProcessError(format!("failed to write handshake: {}", e)))
}

/// Heartbeat the lease until a shutdown signal or the run deadline, then
/// release it.
fn hold(mut lease: ActiveLease, session: Duration, run_millis: u64) -> Result<()> {
    let deadline = (run_millis > 0).then(|| Instant::now() + Duration::from_millis(run_millis));
    let mut next_heartbeat = Instant::now() + session;

    loop {
        if SHUTDOWN.load(Ordering::SeqCst) {
            tracing::info!("received shutdown signal, releasing lease");
            break;
        }
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            tracing::info!("run time elapsed, releasing lease");
            break;
        }

        if Instant::now() >= next_heartbeat {
            if !lease.heartbeat()? {
                return Err(NslockError::UserError(format!(
                    "lease for namespace '{}' was lost to another owner",
                    lease.record().namespace
                )));
            }
            next_heartbeat += session;
        }

        thread::sleep(TICK);
    }

    lease.release()
}

fn install_signal_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_shutdown_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGTERM, Signal::SIGINT] {
        // Safety: the handler only stores to an atomic flag.
        unsafe {
            sigaction(signal, &action).map_err(|e| {
                NslockError::ProcessError(format!("failed to install {} handler: {}", signal, e))
            })?;
        }
    }
    Ok(())
}

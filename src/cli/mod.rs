//! CLI argument parsing for nslock.
//!
//! Uses clap derive macros for declarative argument definitions. This
//! module defines the command structure; actual implementations are in the
//! `commands` module.

use crate::backend::Backend;
use crate::config;
use crate::error::{NslockError, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// nslock: namespace lease-lock coordinator and backup progress monitor.
///
/// Leases are held by dedicated holder processes that heartbeat a lease
/// record stored in the namespace itself; backup jobs publish a progress
/// record next to it. This binary is both the holder executable and the
/// ops tooling around the records.
#[derive(Parser, Debug)]
#[command(name = "nslock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands for nslock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run as a lock-holding process.
    ///
    /// Takes an exclusive lease on the namespace, reports the outcome as
    /// the first stdout line (OK / FAILURE), then heartbeats the lease
    /// until signalled (SIGTERM/SIGINT) or until --run-millis elapses.
    Hold(HoldArgs),

    /// Stop all lock-holding processes on this host.
    ///
    /// Sends the graceful release signal to every holder process found,
    /// including stragglers left behind by other runs.
    Sweep,

    /// List lease records on a local backend.
    ///
    /// Shows owner, pid and heartbeat age per namespace, flagging holders
    /// that look dead.
    Locks(LocksArgs),

    /// Watch the backup progress record of a namespace.
    ///
    /// Polls the record at a fixed interval and renders it until the job
    /// reports the finished status.
    Monitor(MonitorArgs),
}

/// Backend selection, either from flags or from a config file.
#[derive(Args, Debug)]
pub struct BackendArgs {
    /// Backend kind: local or rest.
    #[arg(long, short = 'B')]
    pub backend: Option<String>,

    /// Toplevel directory of a local backend.
    #[arg(long)]
    pub local_path: Option<PathBuf>,

    /// Host of a REST backend.
    #[arg(long)]
    pub host: Option<String>,

    /// Port of a REST backend.
    #[arg(long)]
    pub port: Option<u16>,

    /// Backend config file (YAML); alternative to the explicit flags.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

impl BackendArgs {
    /// Resolve the arguments into a concrete backend.
    pub fn resolve(&self) -> Result<Backend> {
        if let Some(path) = &self.config {
            return config::load_backend(path);
        }

        let kind = self.backend.as_deref().ok_or_else(|| {
            NslockError::UserError(
                "no backend given: pass --backend or --config\n\
                 Fix: e.g. `--backend local --local-path /mnt/backends/dev`."
                    .to_string(),
            )
        })?;

        config::BackendConfig {
            backend_type: kind.to_string(),
            local_path: self.local_path.clone(),
            host: self.host.clone(),
            port: self.port,
        }
        .into_backend()
    }
}

/// Arguments for the `hold` command.
#[derive(Args, Debug)]
pub struct HoldArgs {
    /// Namespace to grab a lock in.
    #[arg(long)]
    pub namespace: String,

    /// Lock session timeout in seconds -- time between heartbeats.
    #[arg(long, default_value_t = 30)]
    pub session_timeout: u64,

    /// Time in milliseconds the holder should run (0 = until signalled).
    #[arg(long, default_value_t = 0)]
    pub run_millis: u64,

    #[command(flatten)]
    pub backend: BackendArgs,
}

/// Arguments for the `locks` command.
#[derive(Args, Debug)]
pub struct LocksArgs {
    /// Toplevel directory of the local backend to inspect.
    #[arg(long)]
    pub path: PathBuf,
}

/// Arguments for the `monitor` command.
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Namespace whose progress record to watch.
    #[arg(long)]
    pub namespace: String,

    /// Poll interval in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Render once and exit instead of polling until finished.
    #[arg(long)]
    pub once: bool,

    /// Clear the screen between refreshes.
    #[arg(long)]
    pub clear: bool,

    #[command(flatten)]
    pub backend: BackendArgs,
}

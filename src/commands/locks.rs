//! Implementation of the `nslock locks` command.
//!
//! Walks the namespaces of a local backend and renders every lease record
//! found, flagging holders whose heartbeats have gone quiet.

use crate::cli::LocksArgs;
use crate::error::{NslockError, Result};
use crate::lease::{HEARTBEAT_MISSES_BEFORE_STEAL, LOCK_OBJECT_NAME, LeaseRecord};
use std::fs;

pub fn cmd_locks(args: LocksArgs) -> Result<()> {
    if !args.path.is_dir() {
        return Err(NslockError::UserError(format!(
            "backend path '{}' does not exist",
            args.path.display()
        )));
    }

    let entries = fs::read_dir(&args.path).map_err(|e| {
        NslockError::UserError(format!(
            "failed to read backend path '{}': {}",
            args.path.display(),
            e
        ))
    })?;

    let mut records: Vec<LeaseRecord> = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| NslockError::UserError(format!("failed to read backend entry: {}", e)))?;
        let lease_path = entry.path().join(LOCK_OBJECT_NAME);
        if !lease_path.is_file() {
            continue;
        }

        match fs::read_to_string(&lease_path) {
            Ok(content) => match LeaseRecord::from_json(&content) {
                Ok(record) => records.push(record),
                Err(_) => eprintln!("Warning: skipping malformed lease '{}'", lease_path.display()),
            },
            Err(e) => {
                eprintln!("Warning: failed to read '{}': {}", lease_path.display(), e)
            }
        }
    }

    if records.is_empty() {
        println!("No lease records found.");
        return Ok(());
    }

    records.sort_by(|a, b| a.namespace.cmp(&b.namespace));

    println!("Leases ({}):", records.len());
    for record in &records {
        let dead_marker = if record.presumed_dead(HEARTBEAT_MISSES_BEFORE_STEAL) {
            " [DEAD?]"
        } else {
            ""
        };
        println!(
            "  - {} (owner: {}, pid: {}, heartbeat {} ago, every {}s){}",
            record.namespace,
            record.owner,
            record.pid,
            record.age_string(),
            record.heartbeat_interval().as_secs(),
            dead_marker
        );
    }

    Ok(())
}

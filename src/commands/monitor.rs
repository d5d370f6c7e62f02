//! Implementation of the `nslock monitor` command.
//!
//! A lightweight refresh-based view of one namespace's backup progress
//! record. Uses ANSI escape codes to clear the screen between refreshes;
//! exits once the job reports the finished status.

use crate::backend::NamespaceTarget;
use crate::cli::MonitorArgs;
use crate::error::Result;
use crate::monitor::{self, ProgressSample};
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

pub fn cmd_monitor(args: MonitorArgs) -> Result<()> {
    let backend = args.backend.resolve()?;
    let target = NamespaceTarget::new(&args.namespace, backend)?;
    let store = monitor::store_for(&target);
    let interval = Duration::from_millis(args.interval_ms.max(50));

    loop {
        if args.clear {
            clear_screen();
        }

        let sample = store.poll(target.namespace())?;
        let finished = render_once(target.namespace(), sample.as_ref());

        if finished || args.once {
            break;
        }

        thread::sleep(interval);
    }

    Ok(())
}

/// Render the current record; returns true when it is terminal.
fn render_once(namespace: &str, sample: Option<&ProgressSample>) -> bool {
    println!("Backup progress for namespace '{}'  (Ctrl+C to exit)", namespace);
    println!();

    let Some(sample) = sample else {
        println!("  No progress record yet (job not started or record reset).");
        println!();
        return false;
    };

    println!("  Status:       {}", sample.status);
    println!(
        "  Examined:     {} / {} bytes ({}%)",
        sample.seen,
        sample.total_size,
        sample.percent_seen()
    );
    println!("  Remaining:    {} bytes", sample.still_to_be_examined);
    println!("  Kept:         {} bytes", sample.kept);
    println!("  Sent:         {} bytes", sample.sent_to_backend);
    println!("  Pending:      {} bytes", sample.pending);

    if let (Some(start), Some(end)) = (&sample.start_snapshot, &sample.end_snapshot) {
        println!("  Snapshots:    {} .. {}", start, end);
    }
    if let Some(runtime) = sample.runtime_in_seconds {
        println!("  Runtime:      {}s", runtime);
    }
    println!();

    if sample.is_finished() {
        println!("Job finished.");
    }

    io::stdout().flush().ok();
    sample.is_finished()
}

fn clear_screen() {
    print!("\x1b[2J\x1b[H");
    let _ = io::stdout().flush();
}

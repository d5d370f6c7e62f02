//! Implementation of the `nslock sweep` command.

use crate::error::Result;
use crate::lease::sweep_holder_processes;

pub fn cmd_sweep() -> Result<()> {
    let signalled = sweep_holder_processes()?;

    if signalled == 0 {
        println!("No lock processes found.");
    } else {
        println!("Signalled {} lock process(es) for graceful release.", signalled);
    }
    Ok(())
}

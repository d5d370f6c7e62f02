//! Background job tasks.
//!
//! A monitored job runs on its own thread; its join result embeds either
//! the job's output or its error, so a failure is never lost between the
//! job and the monitoring loop.

use crate::error::{NslockError, Result};
use std::any::Any;
use std::thread;

/// A background job whose progress is observed by the monitor.
pub struct JobTask<T> {
    handle: thread::JoinHandle<Result<T>>,
}

impl<T: Send + 'static> JobTask<T> {
    /// Start the job on a background thread.
    pub fn spawn<F>(f: F) -> Result<Self>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("job".to_string())
            .spawn(f)
            .map_err(|e| {
                NslockError::ProcessError(format!("failed to spawn background job: {}", e))
            })?;
        Ok(Self { handle })
    }

    /// Whether the job thread has terminated. Non-blocking.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the job and surface its result. A panicking job is
    /// reported as a process error carrying the panic message.
    pub fn join(self) -> Result<T> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => Err(NslockError::ProcessError(format!(
                "background job panicked: {}",
                panic_message(&*panic)
            ))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

//! The monitoring loop.
//!
//! Runs alongside an already-started [`JobTask`], sampling the job's
//! progress record at a fixed granularity and validating every observed
//! pair of samples. After the task terminates one final sample is taken,
//! which must be the terminal record. A failure of the job itself always
//! takes precedence over a monitoring-side violation.

use crate::error::{NslockError, Result};
use crate::monitor::job::JobTask;
use crate::monitor::progress::{JobStatus, ProgressSample};
use crate::monitor::store::ProgressStore;
use std::thread;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(10);

/// Result of a completed monitoring run.
pub struct MonitorReport<T> {
    /// The job's own output.
    pub output: T,

    /// Retained progress samples: the first observed record, every record
    /// that added byte progress, and the terminal record.
    pub samples: Vec<ProgressSample>,
}

/// Validates and accumulates the samples of one monitoring run.
///
/// Every observed sample is checked against its immediate predecessor;
/// only samples representing forward progress are retained, except for the
/// first one and the terminal one.
#[derive(Default)]
pub struct ProgressTracker {
    last_observed: Option<ProgressSample>,
    samples: Vec<ProgressSample>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one mid-run sample. Returns true when the sample is terminal.
    pub fn observe(&mut self, sample: ProgressSample) -> Result<bool> {
        if let Some(prev) = &self.last_observed {
            validate_pair(prev, &sample)?;
            if sample.seen > prev.seen {
                self.samples.push(sample.clone());
            }
        } else {
            self.samples.push(sample.clone());
        }

        let finished = sample.is_finished();
        self.last_observed = Some(sample);
        Ok(finished)
    }

    /// Feed the final sample, taken after the task terminated. The job must
    /// have left a terminal record; the retained sequence is patched so it
    /// always ends with it.
    pub fn observe_terminal(&mut self, sample: Option<ProgressSample>) -> Result<()> {
        let Some(sample) = sample else {
            return Err(NslockError::ProtocolViolation(
                "job completed without a progress record".to_string(),
            ));
        };

        if let Some(prev) = &self.last_observed {
            validate_pair(prev, &sample)?;
        }
        if !sample.is_finished() {
            return Err(NslockError::ProtocolViolation(format!(
                "job completed but its last progress record still reports status '{}'",
                sample.status
            )));
        }

        match self.samples.last_mut() {
            Some(last) if sample.seen > last.seen => self.samples.push(sample.clone()),
            // Same byte progress: the terminal record supersedes the last
            // retained one, keeping the sequence strictly progressing.
            Some(last) => *last = sample.clone(),
            None => self.samples.push(sample.clone()),
        }
        self.last_observed = Some(sample);
        Ok(())
    }

    /// The retained sample sequence.
    pub fn into_samples(self) -> Vec<ProgressSample> {
        self.samples
    }
}

fn validate_pair(prev: &ProgressSample, next: &ProgressSample) -> Result<()> {
    if next.total_size != prev.total_size {
        return Err(NslockError::ProtocolViolation(format!(
            "total_size changed from {} to {}",
            prev.total_size, next.total_size
        )));
    }
    if next.seen < prev.seen {
        return Err(NslockError::ProtocolViolation(format!(
            "seen regressed from {} to {}",
            prev.seen, next.seen
        )));
    }
    if next.sent_to_backend < prev.sent_to_backend {
        return Err(NslockError::ProtocolViolation(format!(
            "sent_to_backend regressed from {} to {}",
            prev.sent_to_backend, next.sent_to_backend
        )));
    }
    if prev.status == JobStatus::Finished && next.status == JobStatus::Running {
        return Err(NslockError::ProtocolViolation(
            "status regressed from finished to running".to_string(),
        ));
    }
    Ok(())
}

/// Monitor a running job until it terminates.
///
/// Samples the job's progress record once per `poll_interval` while the
/// task is alive (a task completing between polls is still followed by one
/// final poll), validating monotonicity and total-size invariance across
/// all observed samples. An invariant violation aborts sampling
/// immediately; the task is then still joined, and its own error, if any,
/// is the one reported.
///
/// # Returns
///
/// * `Ok(MonitorReport)` - The job succeeded and left a well-formed
///   terminal record; carries the job output and the retained samples.
/// * `Err(_)` - The job's own error, or a `ProtocolViolation` when the job
///   succeeded but its progress reporting was broken.
pub fn monitor_job<T: Send + 'static>(
    task: JobTask<T>,
    store: &dyn ProgressStore,
    namespace: &str,
    poll_interval: Duration,
) -> Result<MonitorReport<T>> {
    let mut tracker = ProgressTracker::new();
    let mut monitor_error: Option<NslockError> = None;

    'sampling: while !task.is_finished() {
        // Wait out the poll interval in small ticks so a task completing
        // mid-interval is noticed promptly.
        let wait_until = Instant::now() + poll_interval;
        loop {
            if task.is_finished() {
                break 'sampling;
            }
            let Some(remaining) = wait_until.checked_duration_since(Instant::now()) else {
                break;
            };
            thread::sleep(remaining.min(TICK));
        }

        match store.poll(namespace) {
            // Not reporting yet.
            Ok(None) => {}
            Ok(Some(sample)) => match tracker.observe(sample) {
                // Terminal record observed; stop sampling and let the task
                // wind down.
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    monitor_error = Some(e);
                    break;
                }
            },
            Err(e) => {
                monitor_error = Some(e);
                break;
            }
        }
    }

    // The job's own result; blocks until the thread is gone.
    let output = task.join();

    if monitor_error.is_none() {
        // One final sample after the task's termination.
        let terminal = store
            .poll(namespace)
            .and_then(|sample| tracker.observe_terminal(sample));
        if let Err(e) = terminal {
            monitor_error = Some(e);
        }
    }

    match (output, monitor_error) {
        // The job's failure outranks anything the monitor noticed.
        (Err(job_error), _) => Err(job_error),
        (Ok(_), Some(e)) => Err(e),
        (Ok(output), None) => Ok(MonitorReport {
            output,
            samples: tracker.into_samples(),
        }),
    }
}

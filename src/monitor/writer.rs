//! Job-side progress publishing.
//!
//! The counterpart of the monitoring loop: a job wraps its byte counters
//! in a [`ProgressWriter`], which publishes a consistent snapshot to the
//! progress store at a fixed report interval and once more, with terminal
//! status, on finish. Counters are mutated under a mutex so a published
//! record never mixes fields from different updates.

use crate::error::{NslockError, Result};
use crate::monitor::progress::{JobStatus, ProgressSample};
use crate::monitor::store::ProgressStore;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const FLUSH_TICK: Duration = Duration::from_millis(25);

struct WriterState {
    total_size: u64,
    seen: u64,
    kept: u64,
    sent_to_backend: u64,
    status: JobStatus,
    start_snapshot: Option<String>,
    end_snapshot: Option<String>,
    start_date: DateTime<Utc>,
}

struct WriterInner {
    store: Arc<dyn ProgressStore>,
    namespace: String,
    state: Mutex<WriterState>,
    started: Instant,
    stop: AtomicBool,
}

impl WriterInner {
    fn sample(&self) -> ProgressSample {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        if state.total_size < state.seen {
            tracing::warn!(
                namespace = %self.namespace,
                total_size = state.total_size,
                seen = state.seen,
                "total_size < seen, probably a problem with the volume counters"
            );
        }
        if state.kept < state.sent_to_backend {
            tracing::warn!(
                namespace = %self.namespace,
                kept = state.kept,
                sent_to_backend = state.sent_to_backend,
                "kept < sent_to_backend, probably a problem with the volume counters"
            );
        }

        let still_to_be_examined = state.total_size.saturating_sub(state.seen);
        let queued = state.kept.saturating_sub(state.sent_to_backend);

        ProgressSample {
            total_size: state.total_size,
            seen: state.seen,
            sent_to_backend: state.sent_to_backend,
            still_to_be_examined,
            status: state.status,
            kept: state.kept,
            pending: still_to_be_examined + queued,
            start_snapshot: state.start_snapshot.clone(),
            end_snapshot: state.end_snapshot.clone(),
            start_date: Some(state.start_date),
            update_date: Some(Utc::now()),
            runtime_in_seconds: Some(self.started.elapsed().as_secs()),
        }
    }

    fn publish(&self) -> Result<()> {
        let sample = self.sample();
        self.store.publish(&self.namespace, &sample)
    }
}

/// Publishes a job's progress record while the job runs.
pub struct ProgressWriter {
    inner: Arc<WriterInner>,
    flusher: Option<thread::JoinHandle<()>>,
}

impl ProgressWriter {
    /// Create a writer for one job. Nothing is published until
    /// [`ProgressWriter::start`].
    pub fn new(store: Arc<dyn ProgressStore>, namespace: &str, total_size: u64) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                store,
                namespace: namespace.to_string(),
                state: Mutex::new(WriterState {
                    total_size,
                    seen: 0,
                    kept: 0,
                    sent_to_backend: 0,
                    status: JobStatus::Running,
                    start_snapshot: None,
                    end_snapshot: None,
                    start_date: Utc::now(),
                }),
                started: Instant::now(),
                stop: AtomicBool::new(false),
            }),
            flusher: None,
        }
    }

    /// Publish the first record and start the periodic flusher.
    pub fn start(&mut self, report_interval: Duration) -> Result<()> {
        if self.flusher.is_some() {
            return Err(NslockError::UserError(
                "progress writer is already started".to_string(),
            ));
        }

        tracing::info!(namespace = %self.inner.namespace, "writing first status report");
        self.inner.publish()?;

        let inner = Arc::clone(&self.inner);
        let flusher = thread::Builder::new()
            .name("statuswriter".to_string())
            .spawn(move || {
                let mut next_flush = Instant::now() + report_interval;
                while !inner.stop.load(Ordering::SeqCst) {
                    if Instant::now() >= next_flush {
                        if let Err(e) = inner.publish() {
                            tracing::warn!(
                                namespace = %inner.namespace,
                                "failed to publish progress record: {}",
                                e
                            );
                        }
                        next_flush += report_interval;
                    }
                    thread::sleep(FLUSH_TICK);
                }
            })
            .map_err(|e| {
                NslockError::ProcessError(format!("failed to spawn status writer: {}", e))
            })?;
        self.flusher = Some(flusher);
        Ok(())
    }

    /// Account examined bytes.
    pub fn add_seen(&self, bytes: u64) {
        let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
        state.seen += bytes;
    }

    /// Account bytes kept for shipping.
    pub fn add_kept(&self, bytes: u64) {
        let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
        state.kept += bytes;
    }

    /// Account bytes shipped to the backend.
    pub fn add_sent_to_backend(&self, bytes: u64) {
        let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
        state.sent_to_backend += bytes;
    }

    /// Record the snapshot range the job covers.
    pub fn set_snapshot_range(&self, start: Option<&str>, end: Option<&str>) {
        let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
        state.start_snapshot = start.map(str::to_string);
        state.end_snapshot = end.map(str::to_string);
    }

    /// A consistent snapshot of the current counters.
    pub fn sample(&self) -> ProgressSample {
        self.inner.sample()
    }

    /// Stop the flusher and publish the terminal record.
    pub fn finish(mut self) -> Result<()> {
        self.stop_flusher();

        {
            let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
            if state.total_size != state.seen {
                tracing::warn!(
                    namespace = %self.inner.namespace,
                    total_size = state.total_size,
                    seen = state.seen,
                    "total_size was not equal to seen at the end of the job"
                );
            }
            state.status = JobStatus::Finished;
        }

        tracing::info!(namespace = %self.inner.namespace, "publishing terminal status report");
        self.inner.publish()
    }

    fn stop_flusher(&mut self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(flusher) = self.flusher.take() {
            let _ = flusher.join();
        }
    }
}

impl Drop for ProgressWriter {
    fn drop(&mut self) {
        self.stop_flusher();
    }
}

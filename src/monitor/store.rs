//! Progress record storage.
//!
//! Pure read/publish of the one progress record per namespace. Reads are
//! safe to run concurrently with the job's own writes: file-backed records
//! are replaced atomically, the in-memory store hands out whole snapshots
//! under a mutex.

use crate::backend::Backend;
use crate::error::{NslockError, Result};
use crate::monitor::progress::{PROGRESS_OBJECT_NAME, ProgressSample};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Storage operations on the progress records of a backend, keyed by
/// namespace.
pub trait ProgressStore: Send + Sync {
    /// Read the current record for a namespace. None means the job has not
    /// produced a snapshot (not started, or the snapshot was reset).
    fn poll(&self, namespace: &str) -> Result<Option<ProgressSample>>;

    /// Publish a record for a namespace, replacing any previous one.
    fn publish(&self, namespace: &str, sample: &ProgressSample) -> Result<()>;
}

/// Build the progress store for a target's backend.
pub fn store_for(target: &crate::backend::NamespaceTarget) -> Box<dyn ProgressStore> {
    match target.backend() {
        Backend::Local { path } => Box::new(FileProgressStore::new(path.clone())),
        Backend::Remote { host, port } => Box::new(RestProgressStore::new(host, *port)),
    }
}

/// Progress store on a local filesystem backend.
pub struct FileProgressStore {
    root: PathBuf,
}

impl FileProgressStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace).join(PROGRESS_OBJECT_NAME)
    }
}

impl ProgressStore for FileProgressStore {
    fn poll(&self, namespace: &str) -> Result<Option<ProgressSample>> {
        let path = self.record_path(namespace);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
                NslockError::ProtocolViolation(format!(
                    "malformed progress record '{}': {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NslockError::UserError(format!(
                "failed to read progress record '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    fn publish(&self, namespace: &str, sample: &ProgressSample) -> Result<()> {
        let namespace_dir = self.root.join(namespace);
        if !namespace_dir.is_dir() {
            return Err(NslockError::UserError(format!(
                "namespace '{}' does not exist under backend path '{}'",
                namespace,
                self.root.display()
            )));
        }

        let json = serde_json::to_string_pretty(sample).map_err(|e| {
            NslockError::UserError(format!("failed to serialize progress record: {}", e))
        })?;
        crate::fs::atomic_write_file(self.record_path(namespace), &json)
    }
}

/// Progress store on a remote REST object store.
pub struct RestProgressStore {
    base_url: String,
    agent: ureq::Agent,
}

impl RestProgressStore {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
            agent: ureq::agent(),
        }
    }

    fn record_url(&self, namespace: &str) -> String {
        format!("{}/{}/{}", self.base_url, namespace, PROGRESS_OBJECT_NAME)
    }
}

impl ProgressStore for RestProgressStore {
    fn poll(&self, namespace: &str) -> Result<Option<ProgressSample>> {
        let url = self.record_url(namespace);
        match self.agent.get(&url).call() {
            Ok(response) => {
                let body = response.into_string().map_err(|e| {
                    NslockError::UserError(format!(
                        "failed to read progress object '{}': {}",
                        url, e
                    ))
                })?;
                serde_json::from_str(&body).map(Some).map_err(|e| {
                    NslockError::ProtocolViolation(format!(
                        "malformed progress record '{}': {}",
                        url, e
                    ))
                })
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(NslockError::UserError(format!(
                "failed to fetch progress object '{}': {}",
                url, e
            ))),
        }
    }

    fn publish(&self, namespace: &str, sample: &ProgressSample) -> Result<()> {
        let url = self.record_url(namespace);
        let json = serde_json::to_string(sample).map_err(|e| {
            NslockError::UserError(format!("failed to serialize progress record: {}", e))
        })?;
        self.agent
            .put(&url)
            .send_string(&json)
            .map(|_| ())
            .map_err(|e| {
                NslockError::UserError(format!("failed to put progress object '{}': {}", url, e))
            })
    }
}

/// In-memory progress store for tests and embedded jobs.
#[derive(Default)]
pub struct MemoryProgressStore {
    records: Mutex<HashMap<String, ProgressSample>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the record for a namespace, as a backend reset would.
    pub fn reset(&self, namespace: &str) {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.remove(namespace);
    }
}

impl ProgressStore for MemoryProgressStore {
    fn poll(&self, namespace: &str) -> Result<Option<ProgressSample>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(namespace).cloned())
    }

    fn publish(&self, namespace: &str, sample: &ProgressSample) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.insert(namespace.to_string(), sample.clone());
        Ok(())
    }
}

//! Lease record storage.
//!
//! One lease record per namespace, with an exclusive-create primitive. Two
//! implementations: a local filesystem object store and a remote REST
//! object store.

use crate::backend::Backend;
use crate::error::{NslockError, Result};
use crate::lease::record::{LOCK_OBJECT_NAME, LeaseRecord};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Storage operations on the single lease record of one namespace.
pub trait LeaseStore: Send {
    /// Read the current record, or None when no lease exists.
    fn read(&self) -> Result<Option<LeaseRecord>>;

    /// Create the record exclusively. Returns false when a record already
    /// exists (somebody else holds or just took the lease).
    fn create(&self, record: &LeaseRecord) -> Result<bool>;

    /// Replace the record in place (heartbeat). The caller must have
    /// verified ownership first.
    fn replace(&self, record: &LeaseRecord) -> Result<()>;

    /// Remove the record. Removing an absent record is not an error.
    fn remove(&self) -> Result<()>;

    /// Human-readable location, for logs and error messages.
    fn describe(&self) -> String;
}

/// Build the lease store for a target's backend.
pub fn store_for(target: &crate::backend::NamespaceTarget) -> Result<Box<dyn LeaseStore>> {
    match target.backend() {
        Backend::Local { path } => Ok(Box::new(FileLeaseStore::new(path, target.namespace())?)),
        Backend::Remote { host, port } => Ok(Box::new(RestLeaseStore::new(
            host,
            *port,
            target.namespace(),
        ))),
    }
}

/// Lease store on a local filesystem backend.
///
/// Exclusive creation uses the hard-link trick: the record is first written
/// to a private temp file and then linked into place. `link()` fails with
/// EEXIST when a record is already present, and the record only ever
/// appears with its full content.
pub struct FileLeaseStore {
    namespace_dir: PathBuf,
    lease_path: PathBuf,
}

impl FileLeaseStore {
    /// Create a store for one namespace. The namespace directory must
    /// already exist; creating namespaces is the backend's job.
    pub fn new(root: &Path, namespace: &str) -> Result<Self> {
        let namespace_dir = root.join(namespace);
        if !namespace_dir.is_dir() {
            return Err(NslockError::UserError(format!(
                "namespace '{}' does not exist under backend path '{}'",
                namespace,
                root.display()
            )));
        }
        let lease_path = namespace_dir.join(LOCK_OBJECT_NAME);
        Ok(Self {
            namespace_dir,
            lease_path,
        })
    }
}

impl LeaseStore for FileLeaseStore {
    fn read(&self) -> Result<Option<LeaseRecord>> {
        match fs::read_to_string(&self.lease_path) {
            Ok(content) => LeaseRecord::from_json(&content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NslockError::UserError(format!(
                "failed to read lease record '{}': {}",
                self.lease_path.display(),
                e
            ))),
        }
    }

    fn create(&self, record: &LeaseRecord) -> Result<bool> {
        let temp_path = self
            .namespace_dir
            .join(format!(".{}.{}.tmp", LOCK_OBJECT_NAME, std::process::id()));

        let json = record.to_json()?;
        let mut file = File::create(&temp_path).map_err(|e| {
            NslockError::UserError(format!(
                "failed to create temporary lease file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                let _ = fs::remove_file(&temp_path);
                NslockError::UserError(format!("failed to write lease record: {}", e))
            })?;
        drop(file);

        let linked = match fs::hard_link(&temp_path, &self.lease_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(NslockError::UserError(format!(
                "failed to take lease '{}': {}",
                self.lease_path.display(),
                e
            ))),
        };
        let _ = fs::remove_file(&temp_path);
        linked
    }

    fn replace(&self, record: &LeaseRecord) -> Result<()> {
        crate::fs::atomic_write_file(&self.lease_path, &record.to_json()?)
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.lease_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NslockError::UserError(format!(
                "failed to remove lease record '{}': {}",
                self.lease_path.display(),
                e
            ))),
        }
    }

    fn describe(&self) -> String {
        self.lease_path.display().to_string()
    }
}

/// Lease store on a remote REST object store.
///
/// The record is an object under the namespace; exclusive creation maps to
/// a conditional PUT (`If-None-Match: *`).
pub struct RestLeaseStore {
    url: String,
    agent: ureq::Agent,
}

impl RestLeaseStore {
    pub fn new(host: &str, port: u16, namespace: &str) -> Self {
        Self {
            url: format!("http://{}:{}/{}/{}", host, port, namespace, LOCK_OBJECT_NAME),
            agent: ureq::agent(),
        }
    }
}

impl LeaseStore for RestLeaseStore {
    fn read(&self) -> Result<Option<LeaseRecord>> {
        match self.agent.get(&self.url).call() {
            Ok(response) => {
                let body = response.into_string().map_err(|e| {
                    NslockError::UserError(format!(
                        "failed to read lease object '{}': {}",
                        self.url, e
                    ))
                })?;
                LeaseRecord::from_json(&body).map(Some)
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(NslockError::UserError(format!(
                "failed to fetch lease object '{}': {}",
                self.url, e
            ))),
        }
    }

    fn create(&self, record: &LeaseRecord) -> Result<bool> {
        match self
            .agent
            .put(&self.url)
            .set("If-None-Match", "*")
            .send_string(&record.to_json()?)
        {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(409, _)) | Err(ureq::Error::Status(412, _)) => Ok(false),
            Err(e) => Err(NslockError::UserError(format!(
                "failed to put lease object '{}': {}",
                self.url, e
            ))),
        }
    }

    fn replace(&self, record: &LeaseRecord) -> Result<()> {
        self.agent
            .put(&self.url)
            .send_string(&record.to_json()?)
            .map(|_| ())
            .map_err(|e| {
                NslockError::UserError(format!(
                    "failed to replace lease object '{}': {}",
                    self.url, e
                ))
            })
    }

    fn remove(&self) -> Result<()> {
        match self.agent.delete(&self.url).call() {
            Ok(_) | Err(ureq::Error::Status(404, _)) => Ok(()),
            Err(e) => Err(NslockError::UserError(format!(
                "failed to delete lease object '{}': {}",
                self.url, e
            ))),
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

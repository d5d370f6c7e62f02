//! Backend configuration files.
//!
//! A backend config is a small YAML document describing how to reach the
//! object store hosting a set of namespaces. Unknown fields are ignored for
//! forward compatibility; required fields depend on the backend kind.
//!
//! ```yaml
//! backend_type: local
//! local_path: /mnt/backends/dev
//! ```
//!
//! ```yaml
//! backend_type: rest
//! host: dss.internal
//! port: 23509
//! ```

use crate::backend::{Backend, DEFAULT_REST_PORT};
use crate::error::{NslockError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk backend configuration.
///
/// This is the raw parse result; [`BackendConfig::into_backend`] validates
/// it into a [`Backend`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend kind: `local` or `rest` (case-insensitive).
    pub backend_type: String,

    /// Toplevel directory of a local backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,

    /// Host of a REST backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port of a REST backend (default 23509).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl BackendConfig {
    /// Load a backend config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            NslockError::UserError(format!(
                "failed to read backend config '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            NslockError::UserError(format!(
                "failed to parse backend config '{}': {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Validate the config into a concrete backend.
    ///
    /// An unknown `backend_type` is a [`NslockError::BackendNotSupported`];
    /// a known kind missing its required fields is a
    /// [`NslockError::WrongArgumentType`].
    pub fn into_backend(self) -> Result<Backend> {
        match self.backend_type.to_ascii_lowercase().as_str() {
            "local" => {
                let path = self.local_path.ok_or_else(|| {
                    NslockError::WrongArgumentType(
                        "backend config of type 'local' must provide local_path".to_string(),
                    )
                })?;
                Ok(Backend::Local { path })
            }
            "rest" => {
                let host = self.host.ok_or_else(|| {
                    NslockError::WrongArgumentType(
                        "backend config of type 'rest' must provide host".to_string(),
                    )
                })?;
                Ok(Backend::Remote {
                    host,
                    port: self.port.unwrap_or(DEFAULT_REST_PORT),
                })
            }
            other => Err(NslockError::BackendNotSupported(other.to_string())),
        }
    }
}

/// Load a backend config file and validate it into a backend.
pub fn load_backend<P: AsRef<Path>>(path: P) -> Result<Backend> {
    BackendConfig::load(path)?.into_backend()
}

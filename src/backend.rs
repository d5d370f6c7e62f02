//! Backend and namespace target model.
//!
//! A lease always lives in one namespace of one storage backend. The two
//! supported backend kinds map to distinct holder invocation argument sets:
//! a local filesystem-backed object store addressed by path, and a remote
//! REST object store addressed by host and port.

use crate::error::{NslockError, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Default port of the remote REST object store.
pub const DEFAULT_REST_PORT: u16 = 23509;

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// A storage backend hosting namespaces.
///
/// Closed set: call sites that build invocation arguments or store
/// instances match exhaustively on this enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Local filesystem-backed object store rooted at `path`.
    Local { path: PathBuf },
    /// Remote REST object store.
    Remote { host: String, port: u16 },
}

impl Backend {
    /// The backend kind as it appears in configs and CLI arguments.
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Local { .. } => "local",
            Backend::Remote { .. } => "rest",
        }
    }

    /// Build the backend-selection argument set for a holder invocation.
    pub fn invocation_args(&self) -> Vec<String> {
        match self {
            Backend::Local { path } => vec![
                "--backend".to_string(),
                "local".to_string(),
                "--local-path".to_string(),
                path.display().to_string(),
            ],
            Backend::Remote { host, port } => vec![
                "--backend".to_string(),
                "rest".to_string(),
                "--host".to_string(),
                host.clone(),
                "--port".to_string(),
                port.to_string(),
            ],
        }
    }
}

/// A validated namespace on a concrete backend.
///
/// This is the capability contract the lease client requires: a namespace
/// name plus the backend parameters needed to reach it.
#[derive(Debug, Clone)]
pub struct NamespaceTarget {
    namespace: String,
    backend: Backend,
}

impl NamespaceTarget {
    /// Create a target, validating the namespace name.
    ///
    /// Namespace names are restricted to alphanumerics, dots, underscores
    /// and dashes, and must not start with a separator character.
    pub fn new(namespace: impl Into<String>, backend: Backend) -> Result<Self> {
        let namespace = namespace.into();
        if !NAMESPACE_RE.is_match(&namespace) {
            return Err(NslockError::WrongArgumentType(format!(
                "invalid namespace name '{}': expected [A-Za-z0-9][A-Za-z0-9._-]*",
                namespace
            )));
        }
        Ok(Self { namespace, backend })
    }

    /// The namespace name.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The backend hosting the namespace.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}

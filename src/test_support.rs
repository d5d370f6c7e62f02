use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a local test backend with the given namespaces pre-created.
///
/// Returns the TempDir guard (keep it alive for the test's duration) and
/// the backend root path.
pub(crate) fn create_test_backend(namespaces: &[&str]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().to_path_buf();
    for ns in namespaces {
        create_namespace(&root, ns);
    }
    (temp_dir, root)
}

/// Create one namespace directory under a backend root.
pub(crate) fn create_namespace(root: &Path, namespace: &str) {
    std::fs::create_dir_all(root.join(namespace)).unwrap();
}

//! Per-device build workspaces.
//!
//! A workspace lives at `<build_root>/debug_build_<identity>`. Preparing it
//! destroys whatever the previous build for the same identity left behind
//! and recreates an empty directory. Workspaces are kept after a build so
//! the checkout and toolchain state can be inspected.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{error, info};

use crate::request::{RequestError, validate_identity};

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "debug_build_";

/// Directory name of the checkout inside a workspace.
pub const CHECKOUT_DIR: &str = "repo";

/// Errors raised while preparing a workspace.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WorkspaceError {
    /// Raised when the identity is not a safe path segment.
    #[error(transparent)]
    Identity(#[from] RequestError),
    /// Raised when the workspace directory cannot be created.
    #[error("failed to create workspace {path}: {message}")]
    Create {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

/// An exclusively owned build directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Workspace {
    root: Utf8PathBuf,
}

impl Workspace {
    /// Absolute or build-root-relative path of the workspace.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Path the checkout is cloned into.
    #[must_use]
    pub fn checkout_dir(&self) -> Utf8PathBuf {
        self.root.join(CHECKOUT_DIR)
    }

    /// Opens the workspace as a capability-scoped directory handle.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the directory cannot be opened.
    pub fn open_dir(&self) -> io::Result<Dir> {
        Dir::open_ambient_dir(&self.root, ambient_authority())
    }
}

/// Returns the workspace path for `identity` without touching the disk.
#[must_use]
pub fn workspace_path(build_root: &Utf8Path, identity: &str) -> Utf8PathBuf {
    build_root.join(format!("{WORKSPACE_PREFIX}{identity}"))
}

/// Recreates the workspace for `identity` under `build_root`.
///
/// Removal of a previous workspace is best effort: a failure is logged and
/// preparation continues, leaving the later steps to surface the real cause.
///
/// # Errors
///
/// Returns [`WorkspaceError::Identity`] for unsafe identities and
/// [`WorkspaceError::Create`] when the directory cannot be created.
pub fn prepare(build_root: &Utf8Path, identity: &str) -> Result<Workspace, WorkspaceError> {
    validate_identity(identity)?;
    let root = workspace_path(build_root, identity);
    let name = format!("{WORKSPACE_PREFIX}{identity}");
    let create_error = |path: &Utf8Path, err: &io::Error| WorkspaceError::Create {
        path: path.to_path_buf(),
        message: err.to_string(),
    };

    Dir::create_ambient_dir_all(build_root, ambient_authority())
        .map_err(|err| create_error(build_root, &err))?;
    let parent = Dir::open_ambient_dir(build_root, ambient_authority())
        .map_err(|err| create_error(build_root, &err))?;

    match parent.remove_dir_all(&name) {
        Ok(()) => info!(path = %root, "removed previous workspace"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => error!(path = %root, error = %err, "could not remove previous workspace"),
    }

    match parent.create_dir(&name) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
        Err(err) => return Err(create_error(&root, &err)),
    }

    info!(path = %root, "using workspace");
    Ok(Workspace { root })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn utf8(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non-utf8 tempdir: {}", path.display()))
    }

    #[rstest]
    fn creates_single_empty_directory() {
        let tmp = TempDir::new().expect("tempdir");
        let root = utf8(&tmp);

        let workspace = prepare(&root, "dev42").expect("prepare");

        assert_eq!(workspace.root(), root.join("debug_build_dev42"));
        assert!(workspace.root().is_dir());
        let entries: Vec<_> = std::fs::read_dir(workspace.root()).expect("read").collect();
        assert!(entries.is_empty());
        let siblings: Vec<_> = std::fs::read_dir(&root).expect("read root").collect();
        assert_eq!(siblings.len(), 1);
    }

    #[rstest]
    fn wipes_previous_contents() {
        let tmp = TempDir::new().expect("tempdir");
        let root = utf8(&tmp);
        let first = prepare(&root, "dev42").expect("first prepare");
        std::fs::create_dir_all(first.checkout_dir().join("src")).expect("seed dir");
        std::fs::write(first.root().join("id_rsa"), "secret").expect("seed file");

        let second = prepare(&root, "dev42").expect("second prepare");

        assert_eq!(first, second);
        assert!(!second.checkout_dir().exists());
        assert!(!second.root().join("id_rsa").exists());
    }

    #[rstest]
    fn creates_missing_build_root() {
        let tmp = TempDir::new().expect("tempdir");
        let root = utf8(&tmp).join("nested").join("root");

        let workspace = prepare(&root, "dev42").expect("prepare");

        assert!(workspace.root().is_dir());
    }

    #[rstest]
    fn rejects_traversal_identity() {
        let tmp = TempDir::new().expect("tempdir");
        let root = utf8(&tmp);

        let err = prepare(&root, "../escape").expect_err("identity should be rejected");

        assert!(matches!(err, WorkspaceError::Identity(_)));
        assert!(!root.join("debug_build_..").exists());
    }

    #[rstest]
    fn distinct_identities_get_distinct_workspaces() {
        let tmp = TempDir::new().expect("tempdir");
        let root = utf8(&tmp);
        let a = prepare(&root, "a").expect("a");
        let b = prepare(&root, "b").expect("b");
        assert_ne!(a.root(), b.root());
    }
}

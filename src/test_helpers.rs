//! Shared unit-test fixtures.

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use crate::config::{BuilderConfig, DEFAULT_FALLBACK_BUILD_PATH};

/// Temporary directory standing in for `/workspace`.
pub struct TempRoot {
    _dir: TempDir,
    path: Utf8PathBuf,
}

impl TempRoot {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non-utf8 tempdir: {}", path.display()));
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Config rooted in this directory with the given build command.
    pub fn config(&self, build_command: &str) -> BuilderConfig {
        BuilderConfig {
            build_root: self.path.to_string(),
            output_dir: self.path.join("build").to_string(),
            git_bin: String::from("git"),
            shell_bin: String::from("sh"),
            build_command: build_command.to_owned(),
            build_timeout_secs: 0,
            fetch_timeout_secs: 0,
            fallback_build_path: String::from(DEFAULT_FALLBACK_BUILD_PATH),
            fail_on_empty_archive: false,
        }
    }
}

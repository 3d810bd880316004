//! Shared fixtures for integration tests that run real subprocesses.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared helpers under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/fixtures.rs"]
//! mod fixtures;
//! ```

use std::os::unix::fs::PermissionsExt;

use camino::Utf8PathBuf;
use tempfile::TempDir;

/// Stand-in for `git clone`: records its arguments beside itself and creates
/// the destination directory (the last argument).
const STUB_GIT: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$(dirname "$0")/git-args"
for last; do :; done
mkdir -p "$last"
"#;

/// Toolchain stand-in writing two of the four build outputs.
pub const FAKE_TOOLCHAIN: &str = "mkdir -p .pio/build/esp32dev \
    && printf firmware > .pio/build/esp32dev/firmware.bin \
    && printf boot > .pio/build/esp32dev/bootloader.bin \
    && echo 'Building in release mode' \
    && echo 'warning: flash size guessed' >&2";

/// Build request for device `dev42`, as accepted over the wire.
pub const DEV42_REQUEST: &str = r#"{
    "repository": {"url": "git@example.com:org/fw.git", "branch": "main"},
    "device": {"identity": "dev42", "ssid": "plant-floor"},
    "profile": {"scriptTemplate": "[env:esp32dev]\nboard=esp32dev\nbuild_flags=-DSSID={device[ssid]}\n"},
    "certificates": {"root-ca.pem": "ABC"}
}"#;

/// Temporary build root holding a stub `git`.
pub struct Sandbox {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Sandbox {
    /// Creates the sandbox and installs the stub checkout tool.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
        std::fs::create_dir_all(root.join("bin")).expect("bin dir");
        let git = root.join("bin/git");
        std::fs::write(&git, STUB_GIT).expect("write stub git");
        std::fs::set_permissions(&git, std::fs::Permissions::from_mode(0o755))
            .expect("make stub git executable");
        Self { _dir: dir, root }
    }

    pub fn git_bin(&self) -> Utf8PathBuf {
        self.root.join("bin/git")
    }

    pub fn build_root(&self) -> Utf8PathBuf {
        self.root.join("workspace")
    }

    pub fn output_dir(&self) -> Utf8PathBuf {
        self.root.join("workspace/build")
    }

    /// Arguments the stub checkout tool was last invoked with.
    pub fn git_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.root.join("bin/git-args"))
            .expect("stub git should have run")
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Writes `payload` to a request file and returns its path.
    pub fn write_request(&self, payload: &str) -> Utf8PathBuf {
        let path = self.root.join("request.json");
        std::fs::write(&path, payload).expect("write request");
        path
    }
}

//! Artifact packaging.
//!
//! The toolchain's output directory is derived from the first `[env:<name>]`
//! section of the rendered descriptor. Whichever members of the fixed output
//! set exist there are stored, under their bare file names, in
//! `<output_dir>/<identity>.zip`.

use std::io::Write;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Files collected from the toolchain output directory, in archive order.
pub const BUILD_OUTPUTS: [&str; 4] = [
    "bootloader.bin",
    "partitions.bin",
    "firmware.bin",
    "spiffs.bin",
];

/// Toolchain output directory relative to the source root, minus the
/// environment name.
pub const BUILD_DIR_PREFIX: &str = ".pio/build";

#[expect(
    clippy::expect_used,
    reason = "constant pattern; covered by the environment name tests"
)]
static ENV_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[env:([a-zA-Z0-9_\-]+)\]").expect("invalid environment section regex")
});

/// Errors raised while writing the archive.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PackagingError {
    /// Raised when the archive or its directory cannot be written.
    #[error("failed to write archive {path}: {message}")]
    Write {
        /// Archive or directory being written.
        path: Utf8PathBuf,
        /// Underlying error string.
        message: String,
    },
    /// Raised when a build output exists but cannot be read.
    #[error("failed to read build output {path}: {message}")]
    Read {
        /// Output file being read.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when no build outputs were found and empty archives are
    /// configured to fail.
    #[error("no build outputs found in {build_dir}")]
    NoArtifacts {
        /// Directory that was searched.
        build_dir: Utf8PathBuf,
    },
}

/// A written archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackagedArchive {
    /// Location of the archive.
    pub path: Utf8PathBuf,
    /// Entry names in archive order.
    pub entries: Vec<String>,
}

/// Packaging inputs that do not come from the request.
#[derive(Clone, Copy, Debug)]
pub struct PackageOptions<'a> {
    /// Directory receiving the archive.
    pub output_dir: &'a Utf8Path,
    /// Build path used when the descriptor names no environment.
    pub fallback_build_path: &'a str,
    /// Promote an empty output set to [`PackagingError::NoArtifacts`].
    pub fail_on_empty: bool,
}

/// Name of the first `[env:<name>]` section in `descriptor`.
#[must_use]
pub fn environment_name(descriptor: &str) -> Option<&str> {
    ENV_SECTION
        .captures(descriptor)?
        .get(1)
        .map(|name| name.as_str())
}

/// Toolchain output directory for `descriptor`, relative to the source root.
#[must_use]
pub fn resolve_build_path(descriptor: &str, fallback: &str) -> Utf8PathBuf {
    environment_name(descriptor).map_or_else(
        || {
            warn!(fallback, "no [env:...] section in build descriptor; using fallback build path");
            Utf8PathBuf::from(fallback)
        },
        |name| Utf8Path::new(BUILD_DIR_PREFIX).join(name),
    )
}

/// Removes the archive a previous build left for `identity`.
///
/// Best effort: a missing archive or output directory is not an error and
/// any other failure is logged.
pub fn discard(output_dir: &Utf8Path, identity: &str) {
    let name = format!("{identity}.zip");
    let Ok(dir) = Dir::open_ambient_dir(output_dir, ambient_authority()) else {
        return;
    };
    match dir.remove_file(&name) {
        Ok(()) => info!(path = %output_dir.join(&name), "removed previous archive"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            path = %output_dir.join(&name),
            error = %err,
            "could not remove previous archive"
        ),
    }
}

/// Archives the build outputs found under `source_root`.
///
/// # Errors
///
/// Returns [`PackagingError::Write`] or [`PackagingError::Read`] for
/// filesystem and archive failures, and [`PackagingError::NoArtifacts`] when
/// nothing was found and `options.fail_on_empty` is set.
pub fn package(
    source_root: &Utf8Path,
    descriptor: &str,
    identity: &str,
    options: &PackageOptions<'_>,
) -> Result<PackagedArchive, PackagingError> {
    let build_dir = source_root.join(resolve_build_path(descriptor, options.fallback_build_path));
    let archive_path = options.output_dir.join(format!("{identity}.zip"));
    let write_error = |path: &Utf8Path, message: String| PackagingError::Write {
        path: path.to_path_buf(),
        message,
    };

    let outputs = collect_outputs(&build_dir)?;
    if outputs.is_empty() {
        if options.fail_on_empty {
            return Err(PackagingError::NoArtifacts { build_dir });
        }
        warn!(build_dir = %build_dir, "no build outputs found; archive will be empty");
    }

    Dir::create_ambient_dir_all(options.output_dir, ambient_authority())
        .map_err(|err| write_error(options.output_dir, err.to_string()))?;
    let output = Dir::open_ambient_dir(options.output_dir, ambient_authority())
        .map_err(|err| write_error(options.output_dir, err.to_string()))?;
    let file = output
        .create(format!("{identity}.zip"))
        .map_err(|err| write_error(&archive_path, err.to_string()))?;

    let mut writer = ZipWriter::new(file.into_std());
    let entry_options =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = Vec::with_capacity(outputs.len());
    for (name, bytes) in outputs {
        writer
            .start_file(name, entry_options)
            .map_err(|err| write_error(&archive_path, err.to_string()))?;
        writer
            .write_all(&bytes)
            .map_err(|err| write_error(&archive_path, err.to_string()))?;
        info!(entry = name, bytes = bytes.len(), "archived build output");
        entries.push(name.to_owned());
    }
    writer
        .finish()
        .map_err(|err| write_error(&archive_path, err.to_string()))?;

    info!(path = %archive_path, entries = entries.len(), "archive written");
    Ok(PackagedArchive {
        path: archive_path,
        entries,
    })
}

fn collect_outputs(build_dir: &Utf8Path) -> Result<Vec<(&'static str, Vec<u8>)>, PackagingError> {
    let Ok(dir) = Dir::open_ambient_dir(build_dir, ambient_authority()) else {
        return Ok(Vec::new());
    };
    let mut outputs = Vec::new();
    for name in BUILD_OUTPUTS {
        if !dir.is_file(name) {
            continue;
        }
        let bytes = dir.read(name).map_err(|err| PackagingError::Read {
            path: build_dir.join(name),
            message: err.to_string(),
        })?;
        outputs.push((name, bytes));
    }
    Ok(outputs)
}

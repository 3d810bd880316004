//! Device-specific configuration injected into a fresh checkout.
//!
//! The rendered profile template becomes the toolchain's root descriptor
//! (`platformio.ini`). Certificates are written twice: into `src/certs` for
//! compile-time embedding and into `data` for the filesystem image.

mod template;

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{debug, info};

use crate::request::Device;

pub use template::{TemplateError, render_template};

/// Root build descriptor written into the source tree.
pub const DESCRIPTOR_FILE: &str = "platformio.ini";

/// Certificate directory compiled into the firmware.
pub const CERTS_DIR: &str = "src/certs";

/// Directory packed into the filesystem image.
pub const DATA_DIR: &str = "data";

/// Errors raised while injecting configuration.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InjectionError {
    /// Raised when the profile template cannot be rendered.
    #[error("failed to render build descriptor: {0}")]
    Template(#[from] TemplateError),
    /// Raised when a file or directory cannot be written.
    #[error("failed to write {path}: {message}")]
    Write {
        /// Path that could not be written.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a certificate ends up empty on disk.
    #[error("certificate {name} is empty at {path}")]
    EmptyCertificate {
        /// Certificate file name.
        name: String,
        /// Location that was checked.
        path: Utf8PathBuf,
    },
}

/// Renders the descriptor, writes it, and provisions every certificate.
///
/// Returns the rendered descriptor text so the packager can locate the
/// toolchain output directory.
///
/// # Errors
///
/// Returns [`InjectionError::Template`] when rendering fails, before anything
/// is written, [`InjectionError::Write`] for filesystem failures, and
/// [`InjectionError::EmptyCertificate`] when a written certificate has zero
/// size.
pub fn inject(
    source_root: &Utf8Path,
    template: &str,
    device: &Device,
    certificates: &BTreeMap<String, String>,
) -> Result<String, InjectionError> {
    let rendered = render_template(template, &device.as_object())?;

    let write_error = |path: &Utf8Path, err: &std::io::Error| InjectionError::Write {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    let source = Dir::open_ambient_dir(source_root, ambient_authority())
        .map_err(|err| write_error(source_root, &err))?;

    source
        .write(DESCRIPTOR_FILE, &rendered)
        .map_err(|err| write_error(&source_root.join(DESCRIPTOR_FILE), &err))?;
    info!(path = %source_root.join(DESCRIPTOR_FILE), "wrote build descriptor");
    debug!(descriptor = %rendered, "rendered build descriptor");

    for target in [CERTS_DIR, DATA_DIR] {
        source
            .create_dir_all(target)
            .map_err(|err| write_error(&source_root.join(target), &err))?;
        for (name, content) in certificates {
            let relative = Utf8Path::new(target).join(name);
            let path = source_root.join(&relative);
            source
                .write(&relative, content)
                .map_err(|err| write_error(&path, &err))?;
            let size = source
                .metadata(&relative)
                .map_err(|err| write_error(&path, &err))?
                .len();
            if size == 0 {
                return Err(InjectionError::EmptyCertificate {
                    name: name.clone(),
                    path,
                });
            }
            info!(path = %path, bytes = size, "wrote certificate");
        }
    }

    Ok(rendered)
}

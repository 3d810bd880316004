//! Configuration loading via `ortho-config`.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default root under which per-device workspaces are created.
pub const DEFAULT_BUILD_ROOT: &str = "/workspace";

/// Default directory receiving packaged archives.
pub const DEFAULT_OUTPUT_DIR: &str = "/workspace/build";

/// Default two-phase toolchain invocation.
pub const DEFAULT_BUILD_COMMAND: &str = "pio run && pio run -t buildfs -v";

/// Build path used when the rendered descriptor names no environment.
pub const DEFAULT_FALLBACK_BUILD_PATH: &str = ".pio/build/esp32dev";

/// Builder settings merged from defaults, configuration files, environment
/// variables, and CLI flags in that order of precedence.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "KILN",
    discovery(
        app_name = "kiln",
        env_var = "KILN_CONFIG_PATH",
        config_file_name = "kiln.toml",
        dotfile_name = ".kiln.toml",
        project_file_name = "kiln.toml"
    )
)]
pub struct BuilderConfig {
    /// Root directory holding `debug_build_<identity>` workspaces.
    #[ortho_config(default = DEFAULT_BUILD_ROOT.to_owned())]
    pub build_root: String,
    /// Directory receiving `<identity>.zip` archives.
    #[ortho_config(default = DEFAULT_OUTPUT_DIR.to_owned())]
    pub output_dir: String,
    /// Path to the `git` executable.
    #[ortho_config(default = "git".to_owned())]
    pub git_bin: String,
    /// Shell used to run the build command.
    #[ortho_config(default = "sh".to_owned())]
    pub shell_bin: String,
    /// Toolchain command line, run through `shell_bin -c`.
    #[ortho_config(default = DEFAULT_BUILD_COMMAND.to_owned())]
    pub build_command: String,
    /// Upper bound for the toolchain run in seconds; `0` disables it.
    #[ortho_config(default = 1800)]
    pub build_timeout_secs: u64,
    /// Build output directory used when no `[env:<name>]` section is found.
    #[ortho_config(default = DEFAULT_FALLBACK_BUILD_PATH.to_owned())]
    pub fallback_build_path: String,
    /// Upper bound for the checkout in seconds; `0` disables it.
    #[ortho_config(default = 600)]
    pub fetch_timeout_secs: u64,
    /// Treat an archive with no build outputs as a failed build. Set through
    /// configuration files or the environment only.
    #[ortho_config(skip_cli, default = false)]
    pub fail_on_empty_archive: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl BuilderConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to kiln.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("kiln")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.build_root,
            &FieldMetadata::new("workspace root", "KILN_BUILD_ROOT", "build_root"),
        )?;
        Self::require_field(
            &self.output_dir,
            &FieldMetadata::new("archive directory", "KILN_OUTPUT_DIR", "output_dir"),
        )?;
        Self::require_field(
            &self.git_bin,
            &FieldMetadata::new("git executable", "KILN_GIT_BIN", "git_bin"),
        )?;
        Self::require_field(
            &self.shell_bin,
            &FieldMetadata::new("shell executable", "KILN_SHELL_BIN", "shell_bin"),
        )?;
        Self::require_field(
            &self.build_command,
            &FieldMetadata::new("build command", "KILN_BUILD_COMMAND", "build_command"),
        )?;
        Self::require_field(
            &self.fallback_build_path,
            &FieldMetadata::new(
                "fallback build path",
                "KILN_FALLBACK_BUILD_PATH",
                "fallback_build_path",
            ),
        )?;
        Ok(())
    }

    /// Workspace root as a path.
    #[must_use]
    pub fn build_root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.build_root)
    }

    /// Archive directory as a path.
    #[must_use]
    pub fn output_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.output_dir)
    }

    /// Toolchain timeout, or `None` when disabled.
    #[must_use]
    pub const fn build_timeout(&self) -> Option<Duration> {
        limit(self.build_timeout_secs)
    }

    /// Checkout timeout, or `None` when disabled.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Option<Duration> {
        limit(self.fetch_timeout_secs)
    }
}

const fn limit(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

//! Toolchain invocation with streamed output.

use std::time::Duration;

use camino::Utf8Path;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

use crate::config::BuilderConfig;
use crate::process::{CommandRunner, CommandSpec, LineSink, ProcessError, StreamControl};

/// Errors raised by the build step.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BuildError {
    /// Raised when the toolchain exits with a non-zero code.
    #[error("toolchain exited with status {code}")]
    Failed {
        /// Exit code reported by the shell.
        code: i32,
    },
    /// Raised when the toolchain was killed by a signal.
    #[error("toolchain terminated without an exit code")]
    Terminated,
    /// Raised when the toolchain exceeded the configured timeout.
    #[error("toolchain did not finish within {limit:?}")]
    TimedOut {
        /// Timeout that elapsed.
        limit: Duration,
    },
    /// Raised when the build was cancelled.
    #[error("build cancelled")]
    Cancelled,
    /// Raised when the shell cannot be spawned or supervised.
    #[error(transparent)]
    Process(ProcessError),
}

impl From<ProcessError> for BuildError {
    fn from(value: ProcessError) -> Self {
        match value {
            ProcessError::TimedOut { limit, .. } => Self::TimedOut { limit },
            ProcessError::Cancelled { .. } => Self::Cancelled,
            other => Self::Process(other),
        }
    }
}

/// Builds the shell invocation running the toolchain inside `source_root`.
#[must_use]
pub fn build_command(config: &BuilderConfig, source_root: &Utf8Path) -> CommandSpec {
    CommandSpec::new(&config.shell_bin)
        .arg("-c")
        .arg(&config.build_command)
        .current_dir(source_root)
}

/// Runs the toolchain, forwarding every output line to `sink`.
///
/// # Errors
///
/// Returns a [`BuildError`] unless the toolchain exits with status zero.
pub async fn execute<R: CommandRunner>(
    runner: &R,
    config: &BuilderConfig,
    source_root: &Utf8Path,
    sink: &dyn LineSink,
    cancel: Option<watch::Receiver<bool>>,
) -> Result<(), BuildError> {
    let command = build_command(config, source_root);
    info!(command = %config.build_command, "starting toolchain");
    let control = StreamControl {
        timeout: config.build_timeout(),
        cancel,
    };
    match runner.stream(&command, sink, control).await? {
        Some(0) => {
            info!("toolchain finished");
            Ok(())
        }
        Some(code) => Err(BuildError::Failed { code }),
        None => Err(BuildError::Terminated),
    }
}

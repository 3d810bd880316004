//! Command descriptions, outputs, and the runner abstraction.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::sync::watch;

use super::sink::LineSink;

/// Boxed future returned by [`CommandRunner`] methods.
pub type RunnerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProcessError>> + Send + 'a>>;

/// A fully described subprocess invocation.
///
/// The working directory and environment overrides belong to the invocation,
/// never to the calling process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Working directory for this invocation only.
    pub current_dir: Option<Utf8PathBuf>,
    /// Environment overrides for this invocation only.
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    /// Starts describing an invocation of `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: &Utf8Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Adds an environment override.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Returns a shell-like command string for logs and assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

/// Result of running an external command to completion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Human readable exit status.
    #[must_use]
    pub fn status_text(&self) -> String {
        status_text(self.code)
    }
}

/// Renders an optional exit code for messages.
#[must_use]
pub fn status_text(code: Option<i32>) -> String {
    code.map_or_else(|| String::from("unknown"), |value| value.to_string())
}

/// Limits applied to a supervised invocation.
#[derive(Clone, Debug, Default)]
pub struct StreamControl {
    /// Kill the process tree when it runs longer than this.
    pub timeout: Option<Duration>,
    /// Kill the process tree when this flips to `true`.
    pub cancel: Option<watch::Receiver<bool>>,
}

/// Errors raised while spawning or supervising a subprocess.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProcessError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when reading output or waiting for exit fails.
    #[error("i/o error while running {program}: {message}")]
    Io {
        /// Command being supervised.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the process outlives its timeout.
    #[error("{program} did not finish within {limit:?}")]
    TimedOut {
        /// Command that was terminated.
        program: String,
        /// Timeout that elapsed.
        limit: Duration,
    },
    /// Raised when cancellation was requested.
    #[error("{program} was cancelled")]
    Cancelled {
        /// Command that was terminated.
        program: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion, capturing stdout and stderr, under the
    /// same timeout and cancellation rules as [`CommandRunner::stream`].
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Spawn`] if the command cannot be started, or
    /// [`ProcessError::TimedOut`] or [`ProcessError::Cancelled`] after
    /// terminating the process tree.
    fn run<'a>(
        &'a self,
        command: &'a CommandSpec,
        control: StreamControl,
    ) -> RunnerFuture<'a, CommandOutput>;

    /// Runs `command`, forwarding each stdout and stderr line to `sink` as it
    /// arrives, and returns the exit code (`None` when killed by a signal).
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::TimedOut`] or [`ProcessError::Cancelled`] after
    /// terminating the process tree, or a spawn or i/o error.
    fn stream<'a>(
        &'a self,
        command: &'a CommandSpec,
        sink: &'a dyn LineSink,
        control: StreamControl,
    ) -> RunnerFuture<'a, Option<i32>>;
}

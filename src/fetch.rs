//! Repository checkout.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::BuilderConfig;
use crate::credentials::SshIdentity;
use crate::process::{CommandRunner, CommandSpec, ProcessError, StreamControl};
use crate::request::Repository;
use crate::workspace::Workspace;

/// Errors raised while cloning the repository.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FetchError {
    /// Raised when the checkout tool reports failure.
    #[error("clone of branch {branch} failed with status {status}: {stderr}")]
    Failed {
        /// Branch that was requested.
        branch: String,
        /// Exit status text.
        status: String,
        /// Trimmed standard error of the checkout tool.
        stderr: String,
    },
    /// Raised when the checkout tool cannot be run at all.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Builds the clone invocation for `repository` into `destination`.
///
/// The identity, when present, is scoped to this single invocation with
/// `-c core.sshCommand=...`.
#[must_use]
pub fn clone_command(
    git_bin: &str,
    repository: &Repository,
    destination: &Utf8Path,
    identity: Option<&SshIdentity>,
) -> CommandSpec {
    let mut command = CommandSpec::new(git_bin).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(ssh) = identity {
        command = command
            .arg("-c")
            .arg(format!("core.sshCommand={}", ssh.ssh_command()));
    }
    command
        .arg("clone")
        .arg("-b")
        .arg(&repository.branch)
        .arg("--")
        .arg(&repository.url)
        .arg(destination.as_str())
}

/// Clones `repository` into the workspace and returns the source root.
///
/// The clone is bounded by the configured fetch timeout and killed, with its
/// whole process group, once `cancel` flips to `true`.
///
/// # Errors
///
/// Returns [`FetchError::Failed`] when the checkout exits unsuccessfully and
/// [`FetchError::Process`] when it cannot be spawned, times out, or is
/// cancelled.
pub async fn fetch<R: CommandRunner>(
    runner: &R,
    config: &BuilderConfig,
    workspace: &Workspace,
    repository: &Repository,
    identity: Option<&SshIdentity>,
    cancel: Option<watch::Receiver<bool>>,
) -> Result<Utf8PathBuf, FetchError> {
    let destination = workspace.checkout_dir();
    info!(branch = %repository.branch, "cloning repository");
    let command = clone_command(&config.git_bin, repository, &destination, identity);
    let control = StreamControl {
        timeout: config.fetch_timeout(),
        cancel,
    };
    let output = runner.run(&command, control).await?;
    for line in output.stdout.lines().chain(output.stderr.lines()) {
        if !line.trim().is_empty() {
            debug!(target: "kiln::fetch", "{line}");
        }
    }
    if !output.is_success() {
        return Err(FetchError::Failed {
            branch: repository.branch.clone(),
            status: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        });
    }
    info!(path = %destination, "repository cloned");
    Ok(destination)
}

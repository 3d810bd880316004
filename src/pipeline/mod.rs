//! Build pipeline coordinator.
//!
//! [`BuildPipeline::run`] executes workspace preparation, credential
//! provisioning, checkout, configuration injection, the toolchain run, and
//! packaging strictly in that order. The first fatal error aborts the rest
//! and is returned as a [`PipelineError`] naming its step. Builds for the
//! same device identity are serialised; the workspace is left on disk
//! afterwards for inspection. The previous archive for the identity is
//! removed before the checkout, so a failed build never leaves stale
//! firmware at the archive path.

mod error;
mod locks;

use std::sync::Arc;

use tokio::sync::{OwnedMutexGuard, watch};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::BuilderConfig;
use crate::process::{CommandRunner, LineSink, TracingSink, cancellation};
use crate::request::{BuildRequest, BuildResult, BuildStatus};
use crate::{credentials, fetch, inject, package, toolchain, workspace};

pub use error::{FailureReport, FailureStatus, PipelineError, PipelineStep};
pub use locks::IdentityLocks;

/// Runs build requests against a command runner.
pub struct BuildPipeline<R: CommandRunner> {
    config: BuilderConfig,
    runner: R,
    locks: IdentityLocks,
    sink: Arc<dyn LineSink>,
}

impl<R: CommandRunner> BuildPipeline<R> {
    /// Creates a pipeline that logs toolchain output through `tracing`.
    #[must_use]
    pub fn new(config: BuilderConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            locks: IdentityLocks::new(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Replaces the destination of toolchain output lines.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Configuration the pipeline was built with.
    #[must_use]
    pub const fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Locks serialising builds per identity.
    #[must_use]
    pub const fn locks(&self) -> &IdentityLocks {
        &self.locks
    }

    /// Runs `request` to completion.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`PipelineError`].
    pub async fn run(&self, request: &BuildRequest) -> Result<BuildResult, PipelineError> {
        self.run_with_cancel(request, None).await
    }

    /// Runs `request`, aborting once `cancel` flips to `true`.
    ///
    /// Cancellation is honoured while waiting for the identity lock, during
    /// the checkout, and while the toolchain runs; the running process group
    /// is killed and the lock released.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`PipelineError`], or
    /// [`PipelineError::Cancelled`].
    pub async fn run_with_cancel(
        &self,
        request: &BuildRequest,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<BuildResult, PipelineError> {
        request.validate()?;
        let span = info_span!(
            "build",
            identity = %request.device.identity,
            build_id = %Uuid::new_v4(),
        );
        let outcome = self.run_steps(request, cancel).instrument(span.clone()).await;
        if let Err(err) = &outcome {
            span.in_scope(|| warn!(step = %err.step(), error = %err, "build failed"));
        }
        outcome
    }

    async fn run_steps(
        &self,
        request: &BuildRequest,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<BuildResult, PipelineError> {
        let identity = request.device.identity.as_str();
        let _guard = self.acquire(identity, cancel.clone()).await?;
        info!("build started");

        let ws = workspace::prepare(&self.config.build_root(), identity)?;
        let output_dir = self.config.output_dir();
        package::discard(&output_dir, identity);
        let ssh = credentials::provision(&ws, request.ssh_key())?;
        let source_root = fetch::fetch(
            &self.runner,
            &self.config,
            &ws,
            &request.repository,
            ssh.as_ref(),
            cancel.clone(),
        )
        .await?;
        ensure_not_cancelled(cancel.as_ref())?;

        let descriptor = inject::inject(
            &source_root,
            &request.profile.script_template,
            &request.device,
            &request.certificates,
        )?;
        toolchain::execute(
            &self.runner,
            &self.config,
            &source_root,
            self.sink.as_ref(),
            cancel,
        )
        .await?;

        let archive = package::package(
            &source_root,
            &descriptor,
            identity,
            &package::PackageOptions {
                output_dir: &output_dir,
                fallback_build_path: &self.config.fallback_build_path,
                fail_on_empty: self.config.fail_on_empty_archive,
            },
        )?;

        info!(artifact = %archive.path, "build done");
        Ok(BuildResult {
            status: BuildStatus::Done,
            artifact: archive.path,
            entries: archive.entries,
        })
    }

    async fn acquire(
        &self,
        identity: &str,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<OwnedMutexGuard<()>, PipelineError> {
        ensure_not_cancelled(cancel.as_ref())?;
        tokio::select! {
            guard = self.locks.lock_owned(identity) => Ok(guard),
            () = cancellation(cancel) => Err(PipelineError::Cancelled),
        }
    }
}

fn ensure_not_cancelled(cancel: Option<&watch::Receiver<bool>>) -> Result<(), PipelineError> {
    if cancel.is_some_and(|rx| *rx.borrow()) {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests;

//! Pipeline error taxonomy and the failure report returned to callers.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::fetch::FetchError;
use crate::inject::InjectionError;
use crate::package::PackagingError;
use crate::process::ProcessError;
use crate::request::RequestError;
use crate::toolchain::BuildError;
use crate::workspace::WorkspaceError;

/// Step of the pipeline a failure originated from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStep {
    /// Request validation.
    Request,
    /// Workspace preparation.
    Workspace,
    /// Credential provisioning.
    Credentials,
    /// Repository checkout.
    Fetch,
    /// Descriptor and certificate injection.
    Inject,
    /// Toolchain run.
    Build,
    /// Archive creation.
    Package,
    /// Cooperative cancellation, at any point.
    Cancelled,
}

impl PipelineStep {
    /// Stable lowercase name used in reports and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Workspace => "workspace",
            Self::Credentials => "credentials",
            Self::Fetch => "fetch",
            Self::Inject => "inject",
            Self::Build => "build",
            Self::Package => "package",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a build.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PipelineError {
    /// The request failed validation.
    #[error("request rejected: {0}")]
    Request(#[from] RequestError),
    /// The workspace could not be created.
    #[error("workspace preparation failed: {0}")]
    Workspace(#[from] WorkspaceError),
    /// Identity material could not be written.
    #[error("credential provisioning failed: {0}")]
    Credentials(#[from] CredentialError),
    /// The checkout failed.
    #[error("repository fetch failed: {0}")]
    Fetch(FetchError),
    /// Configuration injection failed.
    #[error("configuration injection failed: {0}")]
    Inject(#[from] InjectionError),
    /// The toolchain failed or timed out.
    #[error("build failed: {0}")]
    Build(BuildError),
    /// The archive could not be written.
    #[error("packaging failed: {0}")]
    Package(#[from] PackagingError),
    /// The build was cancelled before it finished.
    #[error("build cancelled")]
    Cancelled,
}

impl From<FetchError> for PipelineError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::Process(ProcessError::Cancelled { .. }) => Self::Cancelled,
            other => Self::Fetch(other),
        }
    }
}

impl From<BuildError> for PipelineError {
    fn from(value: BuildError) -> Self {
        match value {
            BuildError::Cancelled => Self::Cancelled,
            other => Self::Build(other),
        }
    }
}

impl PipelineError {
    /// Step the failure originated from.
    #[must_use]
    pub const fn step(&self) -> PipelineStep {
        match self {
            Self::Request(_) => PipelineStep::Request,
            Self::Workspace(_) => PipelineStep::Workspace,
            Self::Credentials(_) => PipelineStep::Credentials,
            Self::Fetch(_) => PipelineStep::Fetch,
            Self::Inject(_) => PipelineStep::Inject,
            Self::Build(_) => PipelineStep::Build,
            Self::Package(_) => PipelineStep::Package,
            Self::Cancelled => PipelineStep::Cancelled,
        }
    }

    /// Caller-facing report for this failure.
    #[must_use]
    pub fn report(&self) -> FailureReport {
        FailureReport {
            status: FailureStatus::Failed,
            step: self.step(),
            message: self.to_string(),
        }
    }
}

/// Terminal status of a failed build.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStatus {
    /// The build did not produce an archive.
    Failed,
}

/// Failure descriptor returned instead of a [`crate::BuildResult`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FailureReport {
    /// Always [`FailureStatus::Failed`].
    pub status: FailureStatus,
    /// Originating step.
    pub step: PipelineStep,
    /// Human-readable cause.
    pub message: String,
}

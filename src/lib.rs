//! Core library for the kiln firmware build orchestrator.
//!
//! A [`BuildRequest`] names a repository, a device, a profile template, and
//! certificate blobs. [`BuildPipeline`] turns it into a packaged firmware
//! archive: it prepares a per-device workspace, provisions transient SSH
//! credentials, clones the repository, injects the rendered build descriptor
//! and certificates, runs the toolchain while streaming its output, and zips
//! the resulting binaries.

pub mod config;
pub mod credentials;
pub mod fetch;
pub mod inject;
pub mod package;
pub mod pipeline;
pub mod process;
pub mod request;
#[cfg(test)]
mod test_helpers;
pub mod test_support;
pub mod toolchain;
pub mod workspace;

pub use config::{BuilderConfig, ConfigError};
pub use credentials::{CredentialError, KeyFormat, SshIdentity};
pub use fetch::FetchError;
pub use inject::{InjectionError, TemplateError, render_template};
pub use package::{PackageOptions, PackagedArchive, PackagingError};
pub use pipeline::{
    BuildPipeline, FailureReport, FailureStatus, IdentityLocks, PipelineError, PipelineStep,
};
pub use process::{
    ChannelSink, CommandOutput, CommandRunner, CommandSpec, LineSink, ProcessCommandRunner,
    ProcessError, StreamControl, TeeSink, TracingSink,
};
pub use request::{BuildRequest, BuildResult, BuildStatus, Device, Profile, Repository};
pub use toolchain::BuildError;
pub use workspace::{Workspace, WorkspaceError};

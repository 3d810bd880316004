//! Command-line interface definitions for the `kiln` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `kiln` binary.
#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    about = "Check out, configure, build, and package device firmware",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Run one build request through the pipeline.
    #[command(name = "build", about = "Run one build request through the pipeline")]
    Build(BuildCommand),
}

/// Arguments for the `kiln build` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct BuildCommand {
    /// JSON build request to run, or `-` to read it from standard input.
    ///
    /// The result (`{"status":"done",...}`) or failure report
    /// (`{"status":"failed",...}`) is printed to standard output; logs go to
    /// standard error.
    #[arg(long, short = 'r', value_name = "PATH")]
    pub(crate) request: String,
}

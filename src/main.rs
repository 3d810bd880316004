//! Binary entry point for the kiln CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use kiln::{BuildPipeline, BuildRequest, BuilderConfig, PipelineError, ProcessCommandRunner};
use kiln::request::RequestError;

mod cli;

use cli::{BuildCommand, Cli};

/// Reads the request from standard input instead of a file.
const STDIN_MARKER: &str = "-";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to write result: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(CliError::Pipeline(err)) => {
            if let Err(output) = write_json(io::stdout(), &err.report()) {
                report_error(&output);
            }
            1
        }
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Build(command) => build_command(command).await,
    }
}

async fn build_command(args: BuildCommand) -> Result<(), CliError> {
    let config =
        BuilderConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let payload = read_request(&args.request).map_err(PipelineError::from)?;
    let request = BuildRequest::from_json(&payload).map_err(PipelineError::from)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received; cancelling build");
                cancel_tx.send(true).ok();
            }
            Err(err) => error!(error = %err, "failed to listen for interrupts"),
        }
    });

    let pipeline = BuildPipeline::new(config, ProcessCommandRunner);
    let result = pipeline.run_with_cancel(&request, Some(cancel_rx)).await?;
    write_json(io::stdout(), &result)
}

fn read_request(source: &str) -> Result<String, RequestError> {
    let unreadable = |message: String| RequestError::Unreadable {
        source_name: if source == STDIN_MARKER {
            String::from("stdin")
        } else {
            source.to_owned()
        },
        message,
    };

    if source == STDIN_MARKER {
        return io::read_to_string(io::stdin()).map_err(|err| unreadable(err.to_string()));
    }

    let path = Utf8Path::new(source);
    let file_name = path
        .file_name()
        .ok_or_else(|| unreadable(String::from("path has no file name")))?;
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| unreadable(err.to_string()))?;
    dir.read_to_string(file_name)
        .map_err(|err| unreadable(err.to_string()))
}

fn write_json(mut target: impl Write, value: &impl Serialize) -> Result<(), CliError> {
    serde_json::to_writer(&mut target, value).map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(target).map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

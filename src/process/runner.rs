//! Real command runner backed by `tokio::process`.

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::sink::LineSink;
use super::types::{
    CommandOutput, CommandRunner, CommandSpec, ProcessError, RunnerFuture, StreamControl,
};

/// Runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

enum Outcome<T> {
    Exited(Result<T, ProcessError>),
    TimedOut(Duration),
    Cancelled,
}

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(
        &'a self,
        command: &'a CommandSpec,
        control: StreamControl,
    ) -> RunnerFuture<'a, CommandOutput> {
        Box::pin(async move {
            debug!(command = %command.command_string(), "running command");
            let mut child = spawn(command)?;
            let work = capture_and_wait(&mut child, &command.program);
            let outcome = supervise(work, control).await;
            settle(outcome, &mut child, &command.program).await
        })
    }

    fn stream<'a>(
        &'a self,
        command: &'a CommandSpec,
        sink: &'a dyn LineSink,
        control: StreamControl,
    ) -> RunnerFuture<'a, Option<i32>> {
        Box::pin(async move {
            debug!(command = %command.command_string(), "streaming command");
            let mut child = spawn(command)?;
            let work = pump_and_wait(&mut child, &command.program, sink);
            let outcome = supervise(work, control).await;
            settle(outcome, &mut child, &command.program)
                .await
                .map(|status| status.code())
        })
    }
}

/// Spawns `command` with piped output in its own process group.
fn spawn(command: &CommandSpec) -> Result<Child, ProcessError> {
    let mut cmd = build_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn().map_err(|err| ProcessError::Spawn {
        program: command.program.clone(),
        message: err.to_string(),
    })
}

async fn supervise<T>(
    work: impl Future<Output = Result<T, ProcessError>>,
    control: StreamControl,
) -> Outcome<T> {
    tokio::select! {
        result = work => Outcome::Exited(result),
        limit = deadline(control.timeout) => Outcome::TimedOut(limit),
        () = cancellation(control.cancel) => Outcome::Cancelled,
    }
}

async fn settle<T>(
    outcome: Outcome<T>,
    child: &mut Child,
    program: &str,
) -> Result<T, ProcessError> {
    match outcome {
        Outcome::Exited(result) => result,
        Outcome::TimedOut(limit) => {
            terminate(child, program).await;
            Err(ProcessError::TimedOut {
                program: program.to_owned(),
                limit,
            })
        }
        Outcome::Cancelled => {
            terminate(child, program).await;
            Err(ProcessError::Cancelled {
                program: program.to_owned(),
            })
        }
    }
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    if let Some(dir) = &spec.current_dir {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.envs {
        cmd.env(key, value);
    }
    cmd
}

async fn pump_and_wait(
    child: &mut Child,
    program: &str,
    sink: &dyn LineSink,
) -> Result<ExitStatus, ProcessError> {
    let io_error = |err: std::io::Error| ProcessError::Io {
        program: program.to_owned(),
        message: err.to_string(),
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (out, err) = tokio::join!(forward_lines(stdout, sink), forward_lines(stderr, sink));
    out.map_err(io_error)?;
    err.map_err(io_error)?;
    child.wait().await.map_err(io_error)
}

async fn capture_and_wait(
    child: &mut Child,
    program: &str,
) -> Result<CommandOutput, ProcessError> {
    let io_error = |err: std::io::Error| ProcessError::Io {
        program: program.to_owned(),
        message: err.to_string(),
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (out, err) = tokio::join!(read_all(stdout), read_all(stderr));
    let stdout_text = out.map_err(io_error)?;
    let stderr_text = err.map_err(io_error)?;
    let status = child.wait().await.map_err(io_error)?;
    Ok(CommandOutput {
        code: status.code(),
        stdout: stdout_text,
        stderr: stderr_text,
    })
}

async fn read_all<R>(reader: Option<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut stream) = reader {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Forwards lines as they arrive; invalid UTF-8 is replaced rather than
/// aborting the stream.
async fn forward_lines<R>(reader: Option<R>, sink: &dyn LineSink) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = reader else {
        return Ok(());
    };
    let mut lines = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if lines.read_until(b'\n', &mut buffer).await? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&buffer);
        sink.line(text.trim_end_matches(['\n', '\r']));
    }
}

async fn deadline(timeout: Option<Duration>) -> Duration {
    let Some(limit) = timeout else {
        return std::future::pending().await;
    };
    sleep(limit).await;
    limit
}

/// Resolves once `cancel` flips to `true`; never resolves without a sender.
pub(crate) async fn cancellation(cancel: Option<watch::Receiver<bool>>) {
    let Some(mut receiver) = cancel else {
        return std::future::pending().await;
    };
    let sender_gone = receiver.wait_for(|cancelled| *cancelled).await.is_err();
    if sender_gone {
        // Sender dropped without cancelling; nothing can cancel us any more.
        std::future::pending::<()>().await;
    }
}

/// Kills the child's whole process group, then reaps the child.
async fn terminate(child: &mut Child, program: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok())
            && let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL)
        {
            warn!(program, error = %err, "failed to signal process group");
        }
    }

    if let Err(err) = child.kill().await {
        warn!(program, error = %err, "failed to kill process");
    }
}

//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::process::{
    CommandOutput, CommandRunner, CommandSpec, LineSink, ProcessError, RunnerFuture,
    StreamControl,
};

/// Side effect applied when a scripted response is consumed, for example
/// creating the directory a real `git clone` would have produced.
pub type ScriptedEffect = Arc<dyn Fn(&CommandSpec) + Send + Sync>;

struct ScriptedResponse {
    result: Result<CommandOutput, ProcessError>,
    lines: Vec<String>,
    effect: Option<ScriptedEffect>,
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<ScriptedResponse>,
    invocations: Vec<CommandSpec>,
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Captured and streamed runs draw from the same queue.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<ScriptState>>,
}

impl fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("invocations", &self.lock().invocations.len())
            .finish_non_exhaustive()
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn push(&self, response: ScriptedResponse) {
        self.lock().responses.push_back(response);
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.lock().invocations.clone()
    }

    /// Returns the number of responses not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lock().responses.len()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_exit_code(0);
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.push(ScriptedResponse {
            result: Ok(CommandOutput {
                code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            }),
            lines: Vec::new(),
            effect: None,
        });
    }

    /// Pushes an exit code together with a side effect run on consumption.
    pub fn push_with_effect(
        &self,
        code: Option<i32>,
        effect: impl Fn(&CommandSpec) + Send + Sync + 'static,
    ) {
        self.push(ScriptedResponse {
            result: Ok(CommandOutput {
                code,
                stdout: String::new(),
                stderr: String::new(),
            }),
            lines: Vec::new(),
            effect: Some(Arc::new(effect)),
        });
    }

    /// Pushes a streamed response: `lines` are sent to the sink, then `code`
    /// is returned after `effect` runs.
    pub fn push_stream(
        &self,
        lines: &[&str],
        code: Option<i32>,
        effect: Option<ScriptedEffect>,
    ) {
        self.push(ScriptedResponse {
            result: Ok(CommandOutput {
                code,
                stdout: String::new(),
                stderr: String::new(),
            }),
            lines: lines.iter().map(|line| (*line).to_owned()).collect(),
            effect,
        });
    }

    /// Pushes an error returned instead of an output.
    pub fn push_error(&self, error: ProcessError) {
        self.push(ScriptedResponse {
            result: Err(error),
            lines: Vec::new(),
            effect: None,
        });
    }

    fn next(&self, command: &CommandSpec) -> Result<ScriptedResponse, ProcessError> {
        let mut state = self.lock();
        state.invocations.push(command.clone());
        state
            .responses
            .pop_front()
            .ok_or_else(|| ProcessError::Spawn {
                program: command.program.clone(),
                message: String::from("no scripted response available"),
            })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        command: &'a CommandSpec,
        control: StreamControl,
    ) -> RunnerFuture<'a, CommandOutput> {
        Box::pin(async move {
            let response = self.next(command)?;
            if is_cancelled(&control) {
                return Err(ProcessError::Cancelled {
                    program: command.program.clone(),
                });
            }
            if let Some(effect) = &response.effect {
                effect(command);
            }
            response.result
        })
    }

    fn stream<'a>(
        &'a self,
        command: &'a CommandSpec,
        sink: &'a dyn LineSink,
        control: StreamControl,
    ) -> RunnerFuture<'a, Option<i32>> {
        Box::pin(async move {
            let response = self.next(command)?;
            if is_cancelled(&control) {
                return Err(ProcessError::Cancelled {
                    program: command.program.clone(),
                });
            }
            for line in &response.lines {
                sink.line(line);
            }
            if let Some(effect) = &response.effect {
                effect(command);
            }
            response.result.map(|output| output.code)
        })
    }
}

fn is_cancelled(control: &StreamControl) -> bool {
    control.cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Sink that keeps every line in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lines received so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl LineSink for RecordingSink {
    fn line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(line.to_owned());
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    /// Pass an empty slice to read the environment without racing writers.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

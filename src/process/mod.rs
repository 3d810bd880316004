//! Subprocess execution seam shared by the checkout and build steps.
//!
//! Every invocation is described by a [`CommandSpec`] carrying its own
//! working directory and environment, so concurrent builds never mutate
//! process-wide state. [`CommandRunner::stream`] forwards output lines to a
//! [`LineSink`] as they arrive; [`CommandRunner::run`] captures them. Both
//! enforce timeouts and cancellation by killing the child's process group.

mod runner;
mod sink;
mod types;

pub use runner::ProcessCommandRunner;
pub(crate) use runner::cancellation;
pub use sink::{ChannelSink, LineSink, TeeSink, TracingSink};
pub use types::{
    CommandOutput, CommandRunner, CommandSpec, ProcessError, RunnerFuture, StreamControl,
    status_text,
};

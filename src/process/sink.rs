//! Destinations for streamed toolchain output.

use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Receives subprocess output one line at a time.
pub trait LineSink: Send + Sync {
    /// Handles a single line without its trailing newline.
    fn line(&self, line: &str);
}

/// Forwards lines to `tracing` under the `kiln::toolchain` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LineSink for TracingSink {
    fn line(&self, line: &str) {
        info!(target: "kiln::toolchain", "{line}");
    }
}

/// Forwards lines over an unbounded channel so a serving layer can relay
/// build progress to its client while the build runs.
///
/// Lines are dropped silently once the receiver goes away; the build itself
/// is unaffected by a disconnected observer.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: UnboundedSender<String>,
}

impl ChannelSink {
    /// Wraps the sending half of a channel.
    #[must_use]
    pub const fn new(sender: UnboundedSender<String>) -> Self {
        Self { sender }
    }
}

impl LineSink for ChannelSink {
    fn line(&self, line: &str) {
        self.sender.send(line.to_owned()).ok();
    }
}

/// Sends every line to two sinks.
#[derive(Clone, Copy, Debug)]
pub struct TeeSink<A, B> {
    first: A,
    second: B,
}

impl<A: LineSink, B: LineSink> TeeSink<A, B> {
    /// Combines two sinks.
    #[must_use]
    pub const fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: LineSink, B: LineSink> LineSink for TeeSink<A, B> {
    fn line(&self, line: &str) {
        self.first.line(line);
        self.second.line(line);
    }
}

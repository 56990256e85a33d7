use super::{Command, State};
use crate::process::read::{Drained, StreamLine};

impl Command {
    /// Takes at most one pending line from each of stdout and stderr without
    /// waiting. Both sides are `None` when nothing is pending right now.
    pub fn next_line(&self) -> StreamLine {
        match self.inner.queues.drain() {
            Drained::Line(line) => line,
            Drained::Pending | Drained::Exhausted => StreamLine::default(),
        }
    }

    /// Takes the next pending line of the interleaved stdout/stderr queue.
    ///
    /// This queue is filled independently of the one behind
    /// [`next_line`](Self::next_line) and holds every line until it is taken,
    /// so a long-running, chatty command that nobody drains keeps a second
    /// copy of its output here besides the aggregate buffers.
    pub fn next_combined_line(&self) -> Option<Vec<u8>> {
        self.inner.queues.next_combined()
    }

    /// Waits for the next line on either stream. Returns `None` once both
    /// streams are closed, or right away if the command never started.
    pub async fn wait_line(&self) -> Option<StreamLine> {
        if self.state() == State::NotStarted {
            return None;
        }

        self.inner.queues.wait().await
    }

    /// True if neither the stdout nor the stderr queue holds a line.
    pub fn stream_empty(&self) -> bool {
        self.inner.queues.is_empty()
    }

    /// Non-blocking iterator over [`next_line`](Self::next_line).
    ///
    /// Yields empty [`StreamLine`]s while the process is still running with
    /// nothing pending, and ends only once both streams are closed and
    /// drained.
    pub fn lines(&self) -> Lines {
        Lines { node: self.clone() }
    }
}

#[derive(Debug)]
pub struct Lines {
    node: Command,
}

impl Iterator for Lines {
    type Item = StreamLine;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.state() == State::NotStarted {
            return None;
        }

        match self.node.inner.queues.drain() {
            Drained::Line(line) => Some(line),
            Drained::Pending => Some(StreamLine::default()),
            Drained::Exhausted => None,
        }
    }
}

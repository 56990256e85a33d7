//! Command nodes: one external process invocation plus the pipes and
//! sequencing that feed it.
//!
//! A [`Command`] is a shared handle. Cloning it hands out another reference to
//! the same node, which is how nodes refer to their upstream sources without
//! owning them.
//!
//! ```no_run
//! # async fn demo() -> shellchain::Result<()> {
//! use shellchain::command;
//!
//! let words = command("printf").args(["'b\\na\\n'"]);
//! let sorted = command("sort").pipe_stdout(&words)?;
//!
//! sorted.run().await?;
//! assert_eq!(sorted.stdout().await?, b"a\nb\n");
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashSet,
    fmt::{self, Display},
    io,
    process::ExitStatus,
    sync::{Arc, Mutex},
};

use once_cell::sync::OnceCell;
use tokio::sync::watch;

use crate::{
    config::ShellConfig,
    prelude::*,
    process::{
        child::{ChildCommand, ChildDelegate},
        read::{lock, Buffers, LineQueues},
        status::ExitState,
        Channel,
    },
};

use self::execution_plan::{check_acyclic, ExecutionPlan, Input};

pub mod execute;
pub mod execution_plan;
pub mod stream;

pub use self::{
    execution_plan::{Operand, RunMode, State},
    stream::Lines,
};

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Pending,
    Exited(ExitState),
    Failed(String),
}

pub(crate) struct Node {
    program: String,
    config: Arc<ShellConfig>,
    plan: Mutex<ExecutionPlan>,
    state: Mutex<State>,
    pid: OnceCell<u32>,
    delegate: Mutex<Option<ChildDelegate>>,
    outcome: watch::Sender<Outcome>,
    buffers: Arc<Buffers>,
    queues: LineQueues,
}

/// Handle to a single external process invocation.
#[derive(Clone)]
pub struct Command {
    inner: Arc<Node>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("program", &self.inner.program)
            .field("state", &self.state())
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

impl Command {
    pub(crate) fn new(program: impl Into<String>, config: Arc<ShellConfig>) -> Self {
        let (outcome, _) = watch::channel(Outcome::Pending);

        Self {
            inner: Arc::new(Node {
                program: program.into(),
                config,
                plan: Mutex::default(),
                state: Mutex::new(State::NotStarted),
                pid: OnceCell::new(),
                delegate: Mutex::default(),
                outcome,
                buffers: Arc::default(),
                queues: LineQueues::default(),
            }),
        }
    }

    pub fn program(&self) -> &str {
        &self.inner.program
    }

    pub fn arguments(&self) -> Vec<String> {
        self.plan().args
    }

    pub fn run_mode(&self) -> RunMode {
        self.plan().mode
    }

    /// Sets the argument list, replacing any previous one.
    pub fn args<I, A>(self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Display,
    {
        let args = args.into_iter().map(|arg| arg.to_string()).collect();
        self.rewire("args", |plan| plan.args = args);
        self
    }

    /// Pipes `source`'s stdout into this command's stdin. A byte payload is
    /// fed in as-is.
    pub fn pipe_stdout(self, source: impl Into<Operand>) -> Result<Self> {
        self.pipe_from(source, Channel::Stdout)
    }

    pub fn pipe_stderr(self, source: impl Into<Operand>) -> Result<Self> {
        self.pipe_from(source, Channel::Stderr)
    }

    pub fn pipe_combined(self, source: impl Into<Operand>) -> Result<Self> {
        self.pipe_from(source, Channel::Combined)
    }

    /// Feeds a fixed payload into this command's stdin.
    pub fn pipe_literal(self, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        self.rewire("input", |plan| plan.input = Some(Input::Literal(payload)));
        self
    }

    /// Connects `channel` of `source` to this command's stdin, replacing any
    /// previous input.
    pub fn pipe_from(self, source: impl Into<Operand>, channel: Channel) -> Result<Self> {
        let input = match (source.into(), channel) {
            (Operand::Bytes(payload), Channel::Stdout) => Input::Literal(payload),
            (Operand::Bytes(_), channel) => {
                return Err(CommandError::UnsupportedOperand(format!(
                    "a literal payload has no {channel} to pipe into `{}`",
                    self.program()
                )))
            }
            (Operand::Command(source), channel) => {
                check_acyclic(&self, &source)?;
                Input::Pipe { source, channel }
            }
        };

        trace!(program = %self.program(), ?input, "wiring input");
        self.rewire("input", |plan| plan.input = Some(input));
        Ok(self)
    }

    /// Pipes `channel` of this command into `target` and returns `target`.
    pub fn pipe_into(&self, target: Command, channel: Channel) -> Result<Command> {
        target.pipe_from(self, channel)
    }

    /// Makes this command wait for `predecessor` to finish before launching.
    /// No data flows between the two.
    pub fn after(self, predecessor: impl Into<Operand>) -> Result<Self> {
        let predecessor = match predecessor.into() {
            Operand::Command(predecessor) => predecessor,
            Operand::Bytes(_) => {
                return Err(CommandError::UnsupportedOperand(format!(
                    "`{}` can only be sequenced after another command",
                    self.program()
                )))
            }
        };

        check_acyclic(&self, &predecessor)?;

        trace!(program = %self.program(), predecessor = %predecessor.program(), "wiring predecessor");
        self.rewire("predecessor", |plan| plan.predecessor = Some(predecessor));
        Ok(self)
    }

    /// Runs this command on a background task instead of blocking `run`.
    pub fn concurrent(self) -> Self {
        self.rewire("run mode", |plan| plan.mode = RunMode::Concurrent);
        self
    }

    pub fn state(&self) -> State {
        *lock(&self.inner.state)
    }

    /// True from the moment `run` is called until the process has exited.
    pub fn running(&self) -> bool {
        self.state() == State::Running && matches!(*self.inner.outcome.borrow(), Outcome::Pending)
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.pid.get().copied()
    }

    pub fn exit_state(&self) -> Option<ExitState> {
        match *self.inner.outcome.borrow() {
            Outcome::Exited(status) => Some(status),
            _ => None,
        }
    }

    /// Exit code once the process has exited, negated signal number if it was
    /// killed by a signal.
    pub fn return_code(&self) -> Option<i32> {
        self.exit_state().map(|status| status.return_code())
    }

    /// Waits for the process to exit and for its output to be fully captured.
    pub async fn finish(&self) -> Result<ExitState> {
        if self.state() == State::NotStarted {
            return Err(CommandError::NotStarted(self.program().to_owned()));
        }

        let mut outcome = self.inner.outcome.subscribe();
        let outcome = outcome
            .wait_for(|outcome| !matches!(outcome, Outcome::Pending))
            .await
            .map(|outcome| outcome.clone())
            .map_err(|_| CommandError::Launch {
                program: self.program().to_owned(),
                reason: "command was dropped before it finished".into(),
            })?;

        match outcome {
            Outcome::Exited(status) => Ok(status),
            Outcome::Failed(reason) => Err(CommandError::Launch {
                program: self.program().to_owned(),
                reason,
            }),
            Outcome::Pending => unreachable!("waited for a final outcome"),
        }
    }

    /// Captured output of `channel`, waiting for the process to exit first.
    pub async fn output(&self, channel: Channel) -> Result<Vec<u8>> {
        self.finish().await?;
        Ok(self.inner.buffers.snapshot(channel))
    }

    pub async fn stdout(&self) -> Result<Vec<u8>> {
        self.output(Channel::Stdout).await
    }

    pub async fn stderr(&self) -> Result<Vec<u8>> {
        self.output(Channel::Stderr).await
    }

    pub async fn combined(&self) -> Result<Vec<u8>> {
        self.output(Channel::Combined).await
    }

    /// Asks the process to terminate. Does not wait for it to exit.
    pub fn kill(&self) -> Result<()> {
        self.deliver(ChildCommand::Kill)
    }

    /// Asks this command and every command upstream of it (piped sources and
    /// predecessors) to terminate. Nodes without a live process are skipped.
    /// Returns how many processes were signalled.
    ///
    /// A node that has not launched yet is not affected, so a caller that
    /// wants the whole chain gone calls this until [`finish`](Self::finish)
    /// returns.
    pub fn kill_chain(&self) -> usize {
        let mut seen = HashSet::new();
        let mut stack = vec![self.clone()];
        let mut killed = 0;

        while let Some(node) = stack.pop() {
            if !seen.insert(node.node_id()) {
                continue;
            }

            if node.kill().is_ok() {
                trace!(program = %node.program(), "terminating");
                killed += 1;
            }

            stack.extend(node.plan().upstream().cloned());
        }

        killed
    }

    #[cfg(unix)]
    pub fn signal(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        self.deliver(ChildCommand::Signal(signal))
    }

    fn deliver(&self, cmd: ChildCommand) -> Result<()> {
        let delegate = lock(&self.inner.delegate).clone();

        match delegate {
            Some(delegate) if delegate.send(cmd) => Ok(()),
            _ => Err(CommandError::ProcessNotFound(self.program().to_owned())),
        }
    }

    pub(crate) fn plan(&self) -> ExecutionPlan {
        lock(&self.inner.plan).clone()
    }

    pub(crate) fn same_node(&self, other: &Command) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn node_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn rewire(&self, what: &str, f: impl FnOnce(&mut ExecutionPlan)) {
        // hold the state lock so a concurrent `start` can't freeze a half-made change
        let state = lock(&self.inner.state);

        if *state != State::NotStarted {
            warn!(program = %self.program(), "ignoring {what} change on a command that already ran");
            return;
        }

        f(&mut lock(&self.inner.plan));
    }

    /// Moves the node to `Running` and freezes its plan.
    pub(crate) fn start(&self) -> Result<ExecutionPlan> {
        let mut state = lock(&self.inner.state);

        if *state != State::NotStarted {
            return Err(CommandError::AlreadyStarted(self.program().to_owned()));
        }

        *state = State::Running;
        Ok(lock(&self.inner.plan).clone())
    }

    pub(crate) fn exited(&self, status: io::Result<ExitStatus>) {
        lock(&self.inner.delegate).take();

        let outcome = match status {
            Ok(status) => {
                debug!(program = %self.program(), pid = ?self.pid(), ?status, "process exited");
                Outcome::Exited(status.into())
            }
            Err(err) => {
                warn!(program = %self.program(), %err, "failed to wait for process");
                Outcome::Failed(err.to_string())
            }
        };

        self.complete(outcome);
    }

    pub(crate) fn fail(&self, err: &CommandError) {
        self.inner.queues.close();
        self.complete(Outcome::Failed(err.to_string()));
    }

    fn complete(&self, outcome: Outcome) {
        *lock(&self.inner.state) = State::Finished;
        self.inner.outcome.send_replace(outcome);
    }
}

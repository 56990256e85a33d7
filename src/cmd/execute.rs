use async_recursion::async_recursion;

use super::{
    execution_plan::{ExecutionPlan, Input},
    Command, RunMode,
};
use crate::{
    prelude::*,
    process::{
        self,
        child::spawn_waiter,
        read::{lock, spawn_reader},
        write::spawn_feeder,
        SpawnedProcess,
    },
};

impl Command {
    /// Runs the command once.
    ///
    /// Upstream commands are resolved first: a predecessor is run (if it
    /// hasn't been) and waited for, a piped source is run and its selected
    /// output becomes this command's stdin. In [`RunMode::Sequential`] this
    /// returns after the process has exited and its output is captured; in
    /// [`RunMode::Concurrent`] all of that happens on a background task and
    /// this returns immediately.
    #[async_recursion]
    pub async fn run(&self) -> Result<Command> {
        let plan = self.start()?;

        debug!(program = %self.program(), args = ?plan.args, mode = ?plan.mode, "running command");

        match plan.mode {
            RunMode::Concurrent => {
                let node = self.clone();

                tokio::task::spawn(async move {
                    if let Err(err) = node.drive(plan).await {
                        warn!(program = %node.program(), %err, "background command failed");
                        node.fail(&err);
                    }
                });
            }
            RunMode::Sequential => {
                if let Err(err) = self.drive(plan).await {
                    self.fail(&err);
                    return Err(err);
                }

                self.finish().await?;
            }
        }

        Ok(self.clone())
    }

    /// Runs the command unless something else already did.
    async fn ensure_run(&self) -> Result<()> {
        match self.run().await {
            Ok(_) | Err(CommandError::AlreadyStarted(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn drive(&self, plan: ExecutionPlan) -> Result<()> {
        if let Some(predecessor) = &plan.predecessor {
            trace!(program = %self.program(), predecessor = %predecessor.program(), "waiting for predecessor");

            predecessor
                .ensure_run()
                .await
                .map_err(|err| self.upstream_error(predecessor, err))?;
            predecessor
                .finish()
                .await
                .map_err(|err| self.upstream_error(predecessor, err))?;
        }

        let payload = match plan.input {
            None => None,
            Some(Input::Literal(payload)) => Some(payload),
            Some(Input::Pipe { source, channel }) => {
                trace!(program = %self.program(), source = %source.program(), %channel, "resolving piped input");

                source
                    .ensure_run()
                    .await
                    .map_err(|err| self.upstream_error(&source, err))?;

                Some(
                    source
                        .output(channel)
                        .await
                        .map_err(|err| self.upstream_error(&source, err))?,
                )
            }
        };

        self.launch(&plan.args, payload)
    }

    fn launch(&self, args: &[String], payload: Option<Vec<u8>>) -> Result<()> {
        let (stdout_sink, stderr_sink) = self
            .inner
            .queues
            .take_sinks(&self.inner.buffers)
            .ok_or_else(|| CommandError::AlreadyStarted(self.program().to_owned()))?;

        let SpawnedProcess {
            stdin,
            stdout,
            stderr,
            child,
            pid,
        } = process::spawn(&self.inner.config, self.program(), args, payload.is_some())?;

        if let Some(pid) = pid {
            let _ = self.inner.pid.set(pid);
        }

        debug!(program = %self.program(), ?pid, "process launched");

        let readers = vec![
            spawn_reader(stdout, stdout_sink),
            spawn_reader(stderr, stderr_sink),
        ];

        if let (Some(stdin), Some(payload)) = (stdin, payload) {
            spawn_feeder(stdin, payload);
        }

        let node = self.clone();
        let delegate = spawn_waiter(child, pid, readers, move |status| node.exited(status));

        *lock(&self.inner.delegate) = Some(delegate);

        Ok(())
    }

    fn upstream_error(&self, upstream: &Command, err: CommandError) -> CommandError {
        CommandError::Upstream {
            program: self.program().to_owned(),
            upstream: upstream.program().to_owned(),
            reason: err.to_string(),
        }
    }
}

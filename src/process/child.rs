use std::{io, process::ExitStatus};

#[cfg(unix)]
use nix::sys::signal::Signal;
use tokio::{process::Child, select, task::JoinHandle};

use crate::prelude::*;

#[derive(Debug)]
pub enum ChildCommand {
    #[cfg(unix)]
    Signal(Signal),
    Kill,
}

/// Handle to the task that owns a running [`Child`].
///
/// The waiter is the only place the child handle lives; everything else talks
/// to it through this sender. Once the child has exited the receiving end is
/// dropped and sends fail.
#[derive(Debug, Clone)]
pub struct ChildDelegate {
    sender: Sender<ChildCommand>,
}

impl ChildDelegate {
    pub fn send(&self, cmd: ChildCommand) -> bool {
        self.sender.send(cmd).is_ok()
    }
}

/// Spawns the waiter for `child`.
///
/// `on_exit` runs after the child has exited and every reader in `readers`
/// has reached end of stream, so the captured output is complete by then.
pub(crate) fn spawn_waiter<F>(
    mut child: Child,
    pid: Option<u32>,
    readers: Vec<JoinHandle<()>>,
    on_exit: F,
) -> ChildDelegate
where
    F: FnOnce(io::Result<ExitStatus>) + Send + 'static,
{
    let (sender, mut receiver) = unbounded_channel();

    tokio::task::spawn(async move {
        let status = loop {
            select! {
                status = child.wait() => break status,
                Some(cmd) = receiver.recv() => {
                    if let Err(err) = deliver(&mut child, pid, cmd) {
                        warn!(?pid, %err, "failed to deliver command to child");
                    }
                }
            }
        };

        drop(receiver);
        trace!(?pid, ?status, "child exited, waiting for readers");

        for reader in readers {
            if let Err(err) = reader.await {
                warn!(?pid, %err, "reader task failed");
            }
        }

        on_exit(status);
    });

    ChildDelegate { sender }
}

fn deliver(child: &mut Child, pid: Option<u32>, cmd: ChildCommand) -> io::Result<()> {
    trace!(?pid, ?cmd, "delivering command to child");

    match cmd {
        #[cfg(unix)]
        ChildCommand::Signal(signal) => send_signal(pid, signal),
        #[cfg(unix)]
        ChildCommand::Kill => send_signal(pid, Signal::SIGTERM),
        #[cfg(not(unix))]
        ChildCommand::Kill => child.start_kill(),
    }
    .or_else(|err| {
        // fall back to the handle if the pid is unusable
        if pid.is_none() {
            child.start_kill()
        } else {
            Err(err)
        }
    })
}

/// Signals the child's whole process group. Every child leads its own group,
/// so whatever a `sh -c` line forked goes down with the shell.
#[cfg(unix)]
fn send_signal(pid: Option<u32>, signal: Signal) -> io::Result<()> {
    use nix::{sys::signal::killpg, unistd::Pid};

    let pid = pid.ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "child has no pid")
    })?;

    killpg(Pid::from_raw(pid as i32), signal).map_err(io::Error::from)
}

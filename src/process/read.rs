use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::{mpsc::error::TryRecvError, Notify},
    task::JoinHandle,
};

use super::Channel;
use crate::prelude::*;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One step of incremental output: at most one line from each stream.
///
/// Lines keep their trailing newline, exactly as the process wrote them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamLine {
    pub stdout: Option<Vec<u8>>,
    pub stderr: Option<Vec<u8>>,
}

impl StreamLine {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }
}

/// Accumulated output of a node, appended to by the reader tasks.
#[derive(Debug, Default)]
pub(crate) struct Buffers {
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
    combined: Mutex<Vec<u8>>,
}

impl Buffers {
    fn append(&self, channel: Channel, line: &[u8]) {
        match channel {
            Channel::Stdout => lock(&self.stdout).extend_from_slice(line),
            Channel::Stderr => lock(&self.stderr).extend_from_slice(line),
            Channel::Combined => {}
        }
        lock(&self.combined).extend_from_slice(line);
    }

    pub(crate) fn snapshot(&self, channel: Channel) -> Vec<u8> {
        match channel {
            Channel::Stdout => lock(&self.stdout).clone(),
            Channel::Stderr => lock(&self.stderr).clone(),
            Channel::Combined => lock(&self.combined).clone(),
        }
    }
}

struct Senders {
    stdout: Sender<Vec<u8>>,
    stderr: Sender<Vec<u8>>,
    combined: Sender<Vec<u8>>,
}

struct Receivers {
    stdout: Receiver<Vec<u8>>,
    stderr: Receiver<Vec<u8>>,
    combined: Receiver<Vec<u8>>,
}

pub(crate) enum Drained {
    Line(StreamLine),
    Pending,
    Exhausted,
}

/// Pull queues fed by the reader tasks.
///
/// Every line lands in its channel queue and in the combined queue, and stays
/// there until someone pulls it. A node nobody drains keeps its whole output
/// queued next to [`Buffers`].
///
/// The senders live here until launch hands them to the readers; once both
/// readers hit end of stream every sender is gone and draining reports
/// [`Drained::Exhausted`].
pub(crate) struct LineQueues {
    senders: Mutex<Option<Senders>>,
    receivers: Mutex<Receivers>,
    notify: Arc<Notify>,
}

impl Default for LineQueues {
    fn default() -> Self {
        let (stdout_tx, stdout_rx) = unbounded_channel();
        let (stderr_tx, stderr_rx) = unbounded_channel();
        let (combined_tx, combined_rx) = unbounded_channel();

        Self {
            senders: Mutex::new(Some(Senders {
                stdout: stdout_tx,
                stderr: stderr_tx,
                combined: combined_tx,
            })),
            receivers: Mutex::new(Receivers {
                stdout: stdout_rx,
                stderr: stderr_rx,
                combined: combined_rx,
            }),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl LineQueues {
    /// Hands out the stdout and stderr sinks. Only the first call gets them.
    pub(crate) fn take_sinks(&self, buffers: &Arc<Buffers>) -> Option<(LineSink, LineSink)> {
        let senders = lock(&self.senders).take()?;

        let sink = |channel, queue| LineSink {
            channel,
            queue,
            combined: senders.combined.clone(),
            buffers: buffers.clone(),
            notify: self.notify.clone(),
        };

        Some((
            sink(Channel::Stdout, senders.stdout.clone()),
            sink(Channel::Stderr, senders.stderr.clone()),
        ))
    }

    /// Drops the senders without handing them out, for nodes that never
    /// launched a process.
    pub(crate) fn close(&self) {
        lock(&self.senders).take();
        self.notify.notify_waiters();
    }

    pub(crate) fn drain(&self) -> Drained {
        let mut receivers = lock(&self.receivers);

        let (stdout, stdout_closed) = poll(&mut receivers.stdout);
        let (stderr, stderr_closed) = poll(&mut receivers.stderr);

        if stdout.is_some() || stderr.is_some() {
            Drained::Line(StreamLine { stdout, stderr })
        } else if stdout_closed && stderr_closed {
            Drained::Exhausted
        } else {
            Drained::Pending
        }
    }

    pub(crate) fn next_combined(&self) -> Option<Vec<u8>> {
        poll(&mut lock(&self.receivers).combined).0
    }

    pub(crate) fn is_empty(&self) -> bool {
        let receivers = lock(&self.receivers);
        receivers.stdout.is_empty() && receivers.stderr.is_empty()
    }

    pub(crate) async fn wait(&self) -> Option<StreamLine> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.drain() {
                Drained::Line(line) => return Some(line),
                Drained::Exhausted => return None,
                Drained::Pending => notified.await,
            }
        }
    }
}

fn poll(receiver: &mut Receiver<Vec<u8>>) -> (Option<Vec<u8>>, bool) {
    match receiver.try_recv() {
        Ok(line) => (Some(line), false),
        Err(TryRecvError::Empty) => (None, false),
        Err(TryRecvError::Disconnected) => (None, true),
    }
}

pub(crate) struct LineSink {
    channel: Channel,
    queue: Sender<Vec<u8>>,
    combined: Sender<Vec<u8>>,
    buffers: Arc<Buffers>,
    notify: Arc<Notify>,
}

impl LineSink {
    fn push(&self, line: Vec<u8>) {
        self.buffers.append(self.channel, &line);

        // receivers are gone once the owning node is dropped
        let _ = self.combined.send(line.clone());
        let _ = self.queue.send(line);

        self.notify.notify_waiters();
    }
}

/// Drains `source` line by line into `sink` until end of stream.
pub(crate) fn spawn_reader<R>(source: R, sink: LineSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::task::spawn(async move {
        let mut reader = BufReader::new(source);
        let mut line = Vec::new();

        loop {
            match reader.read_until(b'\n', &mut line).await {
                // a trailing line without a newline is still a line
                Ok(0) => {
                    if !line.is_empty() {
                        sink.push(std::mem::take(&mut line));
                    }
                    break;
                }
                Ok(_) if line.ends_with(b"\n") => sink.push(std::mem::take(&mut line)),
                Ok(_) => {}
                // whatever was read so far stays in `line`
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!(channel = %sink.channel, %err, "read failed, closing stream");
                    if !line.is_empty() {
                        sink.push(line);
                    }
                    break;
                }
            }
        }

        trace!(channel = %sink.channel, "reader reached end of stream");

        // wake waiters only after the senders are gone so they observe the close
        let notify = sink.notify.clone();
        drop(sink);
        notify.notify_waiters();
    })
}

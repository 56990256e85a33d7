use std::io;

use tokio::{
    io::{AsyncWriteExt, BufWriter},
    process::ChildStdin,
    task::JoinHandle,
};

/// Writes `payload` to the child's stdin on its own task, then closes it.
pub(crate) fn spawn_feeder(stdin: ChildStdin, payload: Vec<u8>) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        let len = payload.len();

        match feed(stdin, &payload).await {
            Ok(()) => trace!(bytes = len, "stdin payload written"),
            // the child exited or closed stdin without reading everything
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!(bytes = len, "child closed stdin early");
            }
            Err(err) => warn!(%err, "failed to write stdin payload"),
        }
    })
}

async fn feed(stdin: ChildStdin, payload: &[u8]) -> io::Result<()> {
    let mut writer = BufWriter::new(stdin);
    writer.write_all(payload).await?;
    writer.flush().await?;
    writer.shutdown().await
}

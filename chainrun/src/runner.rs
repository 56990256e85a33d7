use std::{
    io::{self, Write},
    time::Duration,
};

use color_eyre::Result;
use shellchain::{Command, StreamLine};
use tokio::{
    select,
    time::{interval, sleep_until, Instant, MissedTickBehavior},
};

use crate::Args;

/// Exit code reported when the pipeline ran past `--timeout`, as timeout(1)
/// does.
pub const TIMED_OUT: i32 = 124;

/// How often a timed-out chain is swept again for processes that launched
/// after the first sweep.
const KILL_SWEEP: Duration = Duration::from_millis(50);

/// Runs `cmd` in the background and drives it to completion, printing its
/// output and enforcing the timeout. Returns the exit code to report.
pub async fn run(cmd: Command, args: &Args) -> Result<i32> {
    let cmd = cmd.concurrent().run().await?;

    let deadline = args.timeout.map(|timeout| Instant::now() + timeout);
    let mut timed_out = false;
    let mut streaming = args.stream;

    let mut sweep = interval(KILL_SWEEP);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let status = loop {
        select! {
            line = cmd.wait_line(), if streaming => match line {
                Some(line) => print_line(&line)?,
                None => streaming = false,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() && !timed_out => {
                warn!(program = %cmd.program(), "timed out, terminating the pipeline");
                timed_out = true;
                cmd.kill_chain();
            }
            // nodes further down may only launch once their upstream is gone
            _ = sweep.tick(), if timed_out => {
                cmd.kill_chain();
            }
            status = cmd.finish() => break status,
        }
    };

    let status = match status {
        Ok(status) => Some(status),
        Err(err) if timed_out => {
            debug!(%err, "pipeline failed after the timeout");
            None
        }
        Err(err) => return Err(err.into()),
    };

    if args.stream {
        // everything is captured by now, drain what the loop didn't get to
        for line in cmd.lines() {
            print_line(&line)?;
        }
    } else if status.is_some() {
        let output = cmd.output(args.channel).await?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(&output)?;
        stdout.flush()?;
    }

    debug!(program = %cmd.program(), ?status, timed_out, "pipeline finished");

    if timed_out {
        return Ok(TIMED_OUT);
    }

    let code = status.map_or(1, |status| status.return_code());
    Ok(if code < 0 { 128 - code } else { code })
}

fn print_line(line: &StreamLine) -> io::Result<()> {
    let mut stdout = io::stdout().lock();

    if let Some(out) = &line.stdout {
        write!(stdout, "out: {}", String::from_utf8_lossy(out))?;
    }

    if let Some(err) = &line.stderr {
        write!(stdout, "err: {}", String::from_utf8_lossy(err))?;
    }

    stdout.flush()
}

use std::process::Stdio;

use itertools::Itertools;
use strum::{Display, EnumString};
use tokio::process::{Child, ChildStdin, ChildStderr, ChildStdout};

use crate::{config::ShellConfig, prelude::*};

pub mod child;
pub mod read;
pub mod status;
pub mod write;

/// Output channel of a node that can be piped or read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    Stdout,
    Stderr,
    /// stdout and stderr interleaved in the order the readers saw them.
    #[strum(serialize = "combined", serialize = "all")]
    Combined,
}

/// A freshly spawned OS process with its standard streams detached.
pub struct SpawnedProcess {
    pub stdin: Option<ChildStdin>,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub child: Child,
    pub pid: Option<u32>,
}

/// Builds the OS command for `program` + `args` according to `config`.
///
/// By default the words are joined with spaces and handed to the configured
/// interpreter (`sh -c`), so quoting and globbing follow the shell. With
/// `direct` set the program is executed as-is with one argument per word.
pub(crate) fn os_command(
    config: &ShellConfig,
    program: &str,
    args: &[String],
) -> tokio::process::Command {
    let mut cmd = if config.direct {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        cmd
    } else {
        let line = std::iter::once(program).chain(args.iter().map(String::as_str)).join(" ");
        let mut cmd = tokio::process::Command::new(&config.interpreter);
        cmd.arg(&config.interpreter_flag).arg(line);
        cmd
    };

    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }
    cmd.envs(&config.env);

    cmd
}

pub(crate) fn spawn(
    config: &ShellConfig,
    program: &str,
    args: &[String],
    with_stdin: bool,
) -> Result<SpawnedProcess> {
    let mut cmd = os_command(config, program, args);

    cmd.stdin(if with_stdin {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    // own group, so signals reach everything the child forks
    #[cfg(unix)]
    cmd.process_group(0);

    trace!("spawning command: {:?}", cmd);

    let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
        program: program.to_owned(),
        source,
    })?;

    let missing = |stream: &str| {
        CommandError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            format!("child {stream} was not captured"),
        ))
    };

    let stdin = child.stdin.take();
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;
    let pid = child.id();

    Ok(SpawnedProcess {
        stdin,
        stdout,
        stderr,
        child,
        pid,
    })
}

#![cfg(unix)]

use std::{path::PathBuf, time::Duration};

use shellchain::{Channel, Command, CommandError, Shell, ShellConfig, State, StreamLine};
use tokio::time::{sleep, timeout};

fn sh(program: &str) -> Command {
    Shell::default().command(program)
}

fn direct(program: &str) -> Command {
    Shell::new(ShellConfig {
        direct: true,
        ..ShellConfig::default()
    })
    .command(program)
}

fn scratch_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("shellchain-{}-{name}", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

async fn launched(cmd: &Command) {
    timeout(Duration::from_secs(5), async {
        while cmd.pid().is_none() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("process never launched");
}

#[tokio::test]
async fn sequenced_command_starts_after_predecessor_finishes() {
    let marker = scratch_file("sequence");

    let writer = sh(&format!("sleep 0.2; echo marker > {}", marker.display()));
    let reader = sh("cat").args([marker.display()]).after(&writer).unwrap();

    reader.run().await.unwrap();

    assert_eq!(writer.state(), State::Finished);
    assert_eq!(reader.return_code(), Some(0));
    assert_eq!(reader.stdout().await.unwrap(), b"marker\n");

    let _ = std::fs::remove_file(marker);
}

#[tokio::test]
async fn sequencing_holds_for_concurrent_nodes() {
    let marker = scratch_file("sequence-concurrent");

    let writer = sh(&format!("sleep 0.2; echo marker > {}", marker.display())).concurrent();
    let reader = sh("cat")
        .args([marker.display()])
        .after(&writer)
        .unwrap()
        .concurrent();

    reader.run().await.unwrap();
    assert!(reader.running());

    reader.finish().await.unwrap();
    assert_eq!(writer.state(), State::Finished);
    assert_eq!(reader.stdout().await.unwrap(), b"marker\n");

    let _ = std::fs::remove_file(marker);
}

#[tokio::test]
async fn stdout_is_piped_byte_for_byte() {
    let hello = sh("printf").args(["'hello\\n'"]);
    let cat = sh("cat").pipe_stdout(&hello).unwrap();

    cat.run().await.unwrap();

    assert_eq!(hello.state(), State::Finished);
    assert_eq!(cat.stdout().await.unwrap(), b"hello\n");
}

#[tokio::test]
async fn large_payloads_are_not_truncated() {
    let zeros = sh("head").args(["-c", "200000", "/dev/zero"]);
    let count = sh("wc").args(["-c"]).pipe_stdout(&zeros).unwrap();

    count.run().await.unwrap();

    let out = String::from_utf8(count.stdout().await.unwrap()).unwrap();
    assert_eq!(out.trim(), "200000");
}

#[tokio::test]
async fn stderr_and_combined_can_be_piped() {
    let noisy = sh("echo out; echo err >&2");
    let errors = sh("cat").pipe_stderr(&noisy).unwrap();
    errors.run().await.unwrap();
    assert_eq!(errors.stdout().await.unwrap(), b"err\n");

    let noisy = sh("echo out; echo err >&2");
    let sorted = sh("sort").pipe_combined(&noisy).unwrap();
    sorted.run().await.unwrap();
    assert_eq!(sorted.stdout().await.unwrap(), b"err\nout\n");
}

#[tokio::test]
async fn literal_input_is_fed_exactly() {
    let count = sh("wc").args(["-c"]).pipe_literal("ping");
    count.run().await.unwrap();
    let out = String::from_utf8(count.stdout().await.unwrap()).unwrap();
    assert_eq!(out.trim(), "4");

    let cat = sh("cat").pipe_literal(b"ping".to_vec());
    cat.run().await.unwrap();
    assert_eq!(cat.stdout().await.unwrap(), b"ping");
}

#[tokio::test]
async fn aggregate_output_is_stable() {
    let echo = sh("echo").args(["same"]);
    echo.run().await.unwrap();

    let first = echo.stdout().await.unwrap();
    let second = echo.stdout().await.unwrap();

    assert_eq!(first, b"same\n");
    assert_eq!(first, second);
    assert_eq!(echo.combined().await.unwrap(), first);
    assert!(echo.stderr().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_run_returns_before_exit() {
    let nap = sh("sleep").args([1]).concurrent();

    let returned = nap.run().await.unwrap();

    assert!(nap.running());
    assert!(returned.running());
    assert_eq!(nap.return_code(), None);

    let status = nap.finish().await.unwrap();
    assert!(status.success());
    assert!(!nap.running());
    assert_eq!(nap.return_code(), Some(0));
}

#[tokio::test]
async fn piped_source_may_run_concurrently() {
    let late = sh("sleep 0.2; echo late").concurrent();
    let cat = sh("cat").pipe_stdout(&late).unwrap();

    cat.run().await.unwrap();

    assert_eq!(cat.stdout().await.unwrap(), b"late\n");
}

#[tokio::test]
async fn iteration_stops_once_output_is_drained() {
    let lines = sh("printf").args(["'a\\nb\\n'"]);
    lines.run().await.unwrap();

    let seen: Vec<StreamLine> = lines.lines().filter(|line| !line.is_empty()).collect();

    assert_eq!(
        seen,
        vec![
            StreamLine {
                stdout: Some(b"a\n".to_vec()),
                stderr: None,
            },
            StreamLine {
                stdout: Some(b"b\n".to_vec()),
                stderr: None,
            },
        ]
    );
    assert!(lines.stream_empty());
    assert_eq!(lines.lines().next(), None);
}

#[tokio::test]
async fn lines_stream_while_running() {
    let talker = sh("echo one; sleep 0.1; echo two >&2; sleep 0.1; echo three").concurrent();
    talker.run().await.unwrap();

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    timeout(Duration::from_secs(5), async {
        while let Some(line) = talker.wait_line().await {
            stdout.extend(line.stdout);
            stderr.extend(line.stderr);
        }
    })
    .await
    .expect("stream never closed");

    assert_eq!(stdout, vec![b"one\n".to_vec(), b"three\n".to_vec()]);
    assert_eq!(stderr, vec![b"two\n".to_vec()]);

    talker.finish().await.unwrap();
    assert_eq!(talker.combined().await.unwrap(), b"one\ntwo\nthree\n");
}

#[tokio::test]
async fn combined_queue_sees_both_streams() {
    let noisy = sh("echo out; echo err >&2");
    noisy.run().await.unwrap();

    let mut combined = Vec::new();
    while let Some(line) = noisy.next_combined_line() {
        combined.push(line);
    }
    combined.sort();

    assert_eq!(combined, vec![b"err\n".to_vec(), b"out\n".to_vec()]);
}

#[tokio::test]
async fn kill_terminates_a_running_process() {
    let nap = direct("sleep").args([30]).concurrent();
    nap.run().await.unwrap();
    launched(&nap).await;

    nap.kill().unwrap();

    let status = timeout(Duration::from_secs(5), nap.finish())
        .await
        .expect("killed process never exited")
        .unwrap();

    assert!(!status.success());
    assert_eq!(status.signal(), Some(15));
    assert_eq!(nap.return_code(), Some(-15));
    assert!(matches!(nap.kill(), Err(CommandError::ProcessNotFound(_))));
}

#[tokio::test]
async fn kill_reaches_what_the_shell_forked() {
    let script = sh("echo started; sleep 5; echo done").concurrent();
    script.run().await.unwrap();
    launched(&script).await;

    // let the first echo land before the line is cut short
    sleep(Duration::from_millis(100)).await;
    script.kill().unwrap();

    let status = timeout(Duration::from_secs(2), script.finish())
        .await
        .expect("finish hung after kill")
        .unwrap();

    assert!(!status.success());
    assert_eq!(script.stdout().await.unwrap(), b"started\n");
}

#[tokio::test]
async fn kill_chain_stops_running_upstream_commands() {
    let slow = sh("sleep 5; echo late");
    let cat = sh("cat").pipe_stdout(&slow).unwrap().concurrent();
    cat.run().await.unwrap();
    launched(&slow).await;

    assert_eq!(cat.pid(), None);
    assert_eq!(cat.kill_chain(), 1);

    timeout(Duration::from_secs(2), cat.finish())
        .await
        .expect("chain kept running after kill_chain")
        .unwrap();

    assert!(!slow.exit_state().unwrap().success());
    assert!(cat.stdout().await.unwrap().is_empty());
}

#[tokio::test]
async fn kill_before_run_fails() {
    let nap = sh("sleep").args([1]);
    assert!(matches!(nap.kill(), Err(CommandError::ProcessNotFound(_))));
}

#[tokio::test]
async fn exit_code_is_data_not_an_error() {
    let failing = sh("exit").args([3]);

    failing.run().await.unwrap();
    let status = failing.finish().await.unwrap();

    assert_eq!(status.code(), Some(3));
    assert_eq!(failing.return_code(), Some(3));
}

#[tokio::test]
async fn commands_run_only_once() {
    let echo = sh("echo").args(["once"]);
    echo.run().await.unwrap();

    assert!(matches!(
        echo.run().await,
        Err(CommandError::AlreadyStarted(_))
    ));

    let echo = echo.args(["twice"]);
    assert_eq!(echo.arguments(), vec!["once"]);
}

#[tokio::test]
async fn launch_failures_surface_through_finish() {
    let missing = direct("shellchain-no-such-program");

    assert!(matches!(
        missing.run().await,
        Err(CommandError::Spawn { .. })
    ));
    assert_eq!(missing.state(), State::Finished);
    assert!(matches!(
        missing.finish().await,
        Err(CommandError::Launch { .. })
    ));
    assert_eq!(missing.lines().next(), None);

    let missing = direct("shellchain-no-such-program");
    let cat = sh("cat").pipe_stdout(&missing).unwrap();
    assert!(matches!(
        cat.run().await,
        Err(CommandError::Upstream { .. })
    ));
}

#[tokio::test]
async fn background_launch_failure_is_reported_on_finish() {
    let missing = direct("shellchain-no-such-program").concurrent();
    missing.run().await.unwrap();

    assert!(matches!(
        missing.finish().await,
        Err(CommandError::Launch { .. })
    ));
    assert_eq!(missing.wait_line().await, None);
}

#[tokio::test]
async fn configured_working_dir_and_env_apply() {
    let shell = Shell::new(ShellConfig {
        working_dir: Some(std::env::temp_dir()),
        env: [("SHELLCHAIN_GREETING".to_string(), "hi".to_string())].into(),
        ..ShellConfig::default()
    });

    let greet = shell.command("echo $SHELLCHAIN_GREETING");
    greet.run().await.unwrap();
    assert_eq!(greet.stdout().await.unwrap(), b"hi\n");

    let pwd = shell.command("pwd").args(["-P"]);
    pwd.run().await.unwrap();
    let expected = std::env::temp_dir().canonicalize().unwrap();
    let out = String::from_utf8(pwd.stdout().await.unwrap()).unwrap();
    assert_eq!(PathBuf::from(out.trim()), expected);
}

#[tokio::test]
async fn output_channel_selects_buffer() {
    let noisy = sh("echo out; echo err >&2");
    noisy.run().await.unwrap();

    assert_eq!(noisy.output(Channel::Stdout).await.unwrap(), b"out\n");
    assert_eq!(noisy.output(Channel::Stderr).await.unwrap(), b"err\n");
    assert_eq!(noisy.output(Channel::Combined).await.unwrap().len(), 8);
}

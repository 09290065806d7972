//! SubprocessRunner tests.
//!
//! Everything here spawns real `bash` processes and some tests deliver
//! SIGINT to the test process itself, so all tests run serially.

use kiwi_core::terminal::{TerminalCoordinator, TerminalState};
use kiwi_core::ui_writer::{RecordingUiWriter, UiEvent};
use kiwi_core::{command_running, InterruptCause, SubprocessError, SubprocessRunner};
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn runner() -> (Arc<RecordingUiWriter>, Arc<TerminalCoordinator>, SubprocessRunner) {
    let writer = Arc::new(RecordingUiWriter::new());
    let terminal = Arc::new(TerminalCoordinator::new(writer.clone()).with_min_dwell(Duration::ZERO));
    let runner = SubprocessRunner::new(terminal.clone())
        .with_kill_grace(Duration::from_millis(500))
        .with_drain_grace(Duration::from_millis(300));
    (writer, terminal, runner)
}

#[tokio::test]
#[serial]
async fn test_echo_is_idempotent() {
    let (_writer, _terminal, runner) = runner();
    let token = CancellationToken::new();

    let first = runner.run("echo hello", &token).await.unwrap();
    let second = runner.run("echo hello", &token).await.unwrap();

    assert_eq!(first, "hello\n");
    assert_eq!(first, second);
}

#[tokio::test]
#[serial]
async fn test_output_is_echoed_live() {
    let (writer, _terminal, runner) = runner();

    runner
        .run("echo out; echo err 1>&2", &CancellationToken::new())
        .await
        .unwrap();

    let events = writer.events();
    assert!(events.contains(&UiEvent::Print("out\n".into())), "events: {:?}", events);
    assert!(events.contains(&UiEvent::Stderr("err\n".into())), "events: {:?}", events);
}

#[tokio::test]
#[serial]
async fn test_stdout_and_stderr_are_combined() {
    let (_writer, _terminal, runner) = runner();

    let output = runner
        .run("echo out; echo err 1>&2", &CancellationToken::new())
        .await
        .unwrap();

    assert!(output.contains("out\n"));
    assert!(output.contains("err\n"));
}

#[tokio::test]
#[serial]
async fn test_pipes_and_conditionals() {
    let (_writer, _terminal, runner) = runner();

    let output = runner
        .run("printf 'b\\na\\n' | sort && echo done", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, "a\nb\ndone\n");
}

#[tokio::test]
#[serial]
async fn test_trailing_newline_is_added() {
    let (_writer, _terminal, runner) = runner();

    let output = runner.run("printf abc", &CancellationToken::new()).await.unwrap();
    assert_eq!(output, "abc\n");

    let empty = runner.run("true", &CancellationToken::new()).await.unwrap();
    assert_eq!(empty, "");
}

#[tokio::test]
#[serial]
async fn test_runs_in_working_dir() {
    let (_writer, terminal, _) = runner();
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("marker.txt"), "x").unwrap();

    let output = SubprocessRunner::new(terminal)
        .with_working_dir(temp.path())
        .run("ls", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, "marker.txt\n");
}

#[tokio::test]
#[serial]
async fn test_non_zero_exit_keeps_output() {
    let (_writer, _terminal, runner) = runner();

    let err = runner
        .run("echo partial; exit 3", &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SubprocessError::NonZeroExit { code, output, .. } => {
            assert_eq!(code, Some(3));
            assert_eq!(output, "partial\n");
        }
        other => panic!("expected NonZeroExit, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_missing_shell_is_a_spawn_error() {
    let (_writer, terminal, _) = runner();

    let err = SubprocessRunner::new(terminal)
        .with_shell("/nonexistent/kiwi-shell")
        .run("echo hi", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SubprocessError::Spawn { .. }), "got {:?}", err);
    assert!(!err.is_retryable());
}

#[tokio::test]
#[serial]
async fn test_background_child_does_not_hang_runner() {
    let (_writer, _terminal, runner) = runner();
    let started = Instant::now();

    let output = runner
        .run("sleep 3 & echo launched", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, "launched\n");
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[tokio::test]
#[serial]
async fn test_caller_cancellation_stops_command() {
    let (_writer, terminal, runner) = runner();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = runner.run("echo started; sleep 10", &token).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    match err {
        SubprocessError::Interrupted { cause, output } => {
            assert_eq!(cause, InterruptCause::Cancelled);
            assert_eq!(output, "started\n");
        }
        other => panic!("expected Interrupted, got {:?}", other),
    }
    assert_eq!(terminal.state(), TerminalState::Idle);
}

#[tokio::test]
#[serial]
async fn test_sigint_interrupts_and_leaves_terminal_idle() {
    let (writer, terminal, runner) = runner();
    terminal.start_tool("[Tool: shell] executing...").await;

    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        // SAFETY: sending a signal to our own pid; the runner has a handler installed.
        unsafe {
            libc::kill(libc::getpid(), libc::SIGINT);
        }
    });

    let started = Instant::now();
    let err = runner.run("sleep 10", &CancellationToken::new()).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    match &err {
        SubprocessError::Interrupted { cause, .. } => {
            assert_eq!(cause, &InterruptCause::Signal("SIGINT".into()));
        }
        other => panic!("expected Interrupted, got {:?}", other),
    }
    assert!(!err.is_retryable());
    assert_eq!(terminal.state(), TerminalState::Idle);
    assert!(writer.output().contains("Received SIGINT"));
}

#[tokio::test]
#[serial]
async fn test_command_running_tracks_active_runs() {
    let (_writer, _terminal, runner) = runner();
    let runner = Arc::new(runner);
    assert!(!command_running());

    let token = CancellationToken::new();
    let task = {
        let runner = runner.clone();
        let token = token.clone();
        tokio::spawn(async move { runner.run("sleep 0.3", &token).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(command_running());

    task.await.unwrap().unwrap();
    assert!(!command_running());

    // A failed run must not leave the flag set either.
    let _ = runner.run("exit 3", &token).await;
    assert!(!command_running());
}

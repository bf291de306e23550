//! Integration tests for command execution and output framing.
//!
//! These tests require the `mock` feature to be enabled.

#![cfg(feature = "mock")]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::TryStreamExt;
use ssh_driver::mock::{self, CommandScript, MockDriver, MockServer};
use ssh_driver::{CommandOptions, DriverConfig, DriverError, Encoding};

fn config() -> DriverConfig {
    DriverConfig::new("exec-host")
        .user("tester")
        .allow_agent(false)
        .identities(Vec::<PathBuf>::new())
        .password("pw")
}

async fn connect(server: &MockServer) -> MockDriver {
    mock::driver(server, config()).await.unwrap()
}

/// Lines split across chunk boundaries are reassembled.
#[tokio::test]
async fn output_lines_are_framed_across_chunks() {
    let server = MockServer::new()
        .would_block(1)
        .accept_password("pw")
        .respond(
            CommandScript::new()
                .stdout("hello\nwor")
                .stdout("ld\n")
                .stderr("oops\n")
                .exit_status(3),
        );
    let mut driver = connect(&server).await;

    let mut run = driver.run_command("greet", CommandOptions::new()).await.unwrap();
    assert_eq!(run.host, "exec-host");
    assert_eq!(run.stdout.collect().await.unwrap(), vec!["hello", "world"]);
    assert_eq!(run.stderr.collect().await.unwrap(), vec!["oops"]);

    driver.wait_finished(Some(&mut run.channel)).await.unwrap();
    assert!(run.channel.is_closed());
    assert_eq!(run.channel.exit_status().unwrap(), 3);
    assert_eq!(server.commands(), vec!["greet"]);
    assert_eq!(server.channels_closed(), 1);
}

#[tokio::test]
async fn sudo_wraps_the_command() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = connect(&server).await;

    let mut run = driver
        .run_command("echo", CommandOptions::new().sudo())
        .await
        .unwrap();
    driver.wait_finished(Some(&mut run.channel)).await.unwrap();

    let mut run = driver
        .run_command("whoami", CommandOptions::new().user("postgres").shell("bash -c"))
        .await
        .unwrap();
    driver.wait_finished(Some(&mut run.channel)).await.unwrap();

    assert_eq!(
        server.commands(),
        vec!["sudo -S $SHELL -c \"echo\"", "sudo -u postgres -S bash -c \"whoami\""]
    );
}

#[tokio::test]
async fn pty_request_uses_configured_terminal() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = mock::driver(&server, config().pty_term("xterm-256color"))
        .await
        .unwrap();

    let mut channel = driver.execute("top -b -n1", true).await.unwrap();
    assert!(channel.pty_requested());
    driver.wait_finished(Some(&mut channel)).await.unwrap();

    assert_eq!(server.pty_requests(), vec!["xterm-256color"]);
}

#[tokio::test]
async fn finishing_twice_is_a_no_op() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = connect(&server).await;

    let mut channel = driver.execute("true", false).await.unwrap();
    channel.finish().await.unwrap();
    channel.finish().await.unwrap();
    driver.wait_finished(None).await.unwrap();

    assert_eq!(server.channels_opened(), 1);
    assert_eq!(server.channels_closed(), 1);
}

#[tokio::test]
async fn execute_on_reuses_an_open_channel() {
    let server = MockServer::new()
        .accept_password("pw")
        .respond(CommandScript::new().stdout("first\n"))
        .respond(CommandScript::new().stdout("second\n"));
    let mut driver = connect(&server).await;

    let mut channel = driver.execute("one", false).await.unwrap();
    let lines = driver.read_output(&channel).collect().await.unwrap();
    assert_eq!(lines, vec!["first"]);

    driver.execute_on(&mut channel, "two", false).await.unwrap();
    driver.wait_finished(Some(&mut channel)).await.unwrap();
    assert_eq!(server.channels_opened(), 1);
}

#[tokio::test]
async fn unterminated_trailing_line_is_yielded() {
    let server = MockServer::new()
        .accept_password("pw")
        .respond(CommandScript::new().stdout("a\n\nb  \r\n  tail  "));
    let mut driver = connect(&server).await;

    let mut run = driver.run_command("cat", CommandOptions::new()).await.unwrap();
    let lines: Vec<String> = run.stdout.into_stream().try_collect().await.unwrap();
    assert_eq!(lines, vec!["a", "", "b", "tail"]);
    driver.wait_finished(Some(&mut run.channel)).await.unwrap();
}

#[tokio::test]
async fn whitespace_only_tail_is_dropped() {
    let server = MockServer::new()
        .accept_password("pw")
        .respond(CommandScript::new().stdout("done\n   "));
    let mut driver = connect(&server).await;

    let mut run = driver.run_command("x", CommandOptions::new()).await.unwrap();
    assert_eq!(run.stdout.collect().await.unwrap(), vec!["done"]);
    driver.wait_finished(Some(&mut run.channel)).await.unwrap();
}

#[tokio::test]
async fn completion_callback_fires_once() {
    let server = MockServer::new()
        .accept_password("pw")
        .respond(CommandScript::new().stdout("x\n"));
    let mut driver = connect(&server).await;
    let fired = Arc::new(AtomicUsize::new(0));

    let mut run = driver.run_command("x", CommandOptions::new()).await.unwrap();
    let counter = Arc::clone(&fired);
    let mut stdout = run.stdout.on_complete(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    while stdout.next_line().await.unwrap().is_some() {}
    assert!(stdout.next_line().await.unwrap().is_none());

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    driver.wait_finished(Some(&mut run.channel)).await.unwrap();
}

#[tokio::test]
async fn latin1_output_is_decoded() {
    let server = MockServer::new()
        .accept_password("pw")
        .respond(CommandScript::new().stdout(b"caf\xe9\n"));
    let mut driver = connect(&server).await;

    let mut run = driver
        .run_command("x", CommandOptions::new().encoding(Encoding::Latin1))
        .await
        .unwrap();
    assert_eq!(run.stdout.collect().await.unwrap(), vec!["café"]);
    driver.wait_finished(Some(&mut run.channel)).await.unwrap();
}

/// A stalled socket surfaces as a timeout, never as an empty result.
#[tokio::test(start_paused = true)]
async fn stalled_socket_times_out() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = mock::driver(&server, config().timeout(Duration::from_secs(5)))
        .await
        .unwrap();

    let server = server.would_block(1);
    server.stall(true);
    let err = driver.execute("sleep 100", false).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(err, DriverError::Timeout { duration, .. } if duration == Duration::from_secs(5)));
}

#[tokio::test]
async fn cancelled_wait_is_reported() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = connect(&server).await;

    let server = server.would_block(1);
    server.stall(true);
    driver.cancellation().cancel();
    let err = driver.execute("sleep 100", false).await.unwrap_err();

    assert!(matches!(err, DriverError::Cancelled { ref host } if host == "exec-host"));
}
